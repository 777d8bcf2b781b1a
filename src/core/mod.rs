pub mod ai;
pub mod effects;
pub mod engine;
pub mod log;
pub mod recovery;
pub mod summary;
pub mod usecases;
pub mod watchdog;
