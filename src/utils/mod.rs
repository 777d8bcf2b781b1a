pub mod colors;
pub mod date;
pub mod formatting;
pub mod geo;
pub mod path;
pub mod time;

// Re-export per compatibilità con il vecchio codice
pub use formatting::describe_source;
pub use formatting::mins2readable;
