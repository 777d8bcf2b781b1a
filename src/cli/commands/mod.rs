pub mod absence;
pub mod ai;
pub mod config;
pub mod db;
pub mod del;
pub mod edit;
pub mod fence;
pub mod heartbeat;
pub mod init;
pub mod list;
pub mod log;
pub mod pause;
pub mod queue;
pub mod recover;
pub mod resume;
pub mod status;
pub mod summary;
pub mod sync;
pub mod track;
pub mod undo;
pub mod voice;
