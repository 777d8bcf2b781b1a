pub mod conflict;
pub mod engine;
pub mod remote;
