pub mod corrections;
pub mod db_utils;
pub mod guard;
pub mod initialize;
pub mod locations;
pub mod log;
pub mod migrate;
pub mod pool;
pub mod queue;
pub mod sessions;
pub mod stats;
pub mod summaries;
pub mod sync_state;
pub mod tracking;
