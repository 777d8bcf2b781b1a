//! Unified application error type.
//! All modules (db, core, sync, cli, utils) return AppError to keep the
//! error handling consistent and easy to manage.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ---------------------------
    // Parsing errors
    // ---------------------------
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid session source: {0}")]
    InvalidSource(String),

    #[error("Invalid tracking status: {0}")]
    InvalidStatus(String),

    #[error("Invalid effect kind: {0}")]
    InvalidEffect(String),

    #[error("Invalid session field: {0}")]
    InvalidField(String),

    // ---------------------------
    // Tracking / use-case errors
    // ---------------------------
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Geofence not found: {0}")]
    FenceNotFound(String),

    #[error("Correction not found: {0}")]
    CorrectionNotFound(String),

    #[error("Geofence radius {0:.0} m is below the {1:.0} m minimum")]
    FenceTooSmall(f64, f64),

    #[error("No location fix available")]
    FixUnavailable,

    #[error("No active session to operate on")]
    NotTracking,

    #[error("A session is already being tracked")]
    AlreadyTracking,

    #[error("Edit rejected: source '{0}' is outranked by existing source '{1}'")]
    Outranked(String, String),

    // ---------------------------
    // Sync / remote errors
    // ---------------------------
    #[error("Remote service unreachable (offline)")]
    Offline,

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("AI service error: {0}")]
    Ai(String),

    // ---------------------------
    // Config errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration")]
    ConfigLoad,

    #[error("Failed to save configuration")]
    ConfigSave,

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

impl AppError {
    /// True when the error marks the remote as unreachable rather than
    /// broken. The effects queue gives these the shortest backoff rung so
    /// reconnection is picked up quickly.
    pub fn is_offline(&self) -> bool {
        matches!(self, AppError::Offline)
    }
}

pub type AppResult<T> = Result<T, AppError>;
