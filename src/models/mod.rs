pub mod correction;
pub mod day_summary;
pub mod effect;
pub mod event;
pub mod location;
pub mod session;
pub mod source;
pub mod tracking;
