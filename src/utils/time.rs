//! Timestamp utilities: parsing `--at` overrides, formatting instants,
//! duration helpers.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a user-supplied timestamp. Accepts RFC 3339
/// (`2025-03-10T09:00:00Z`) or the shorter `YYYY-MM-DD HH:MM[:SS]`, which is
/// taken as UTC.
pub fn parse_at(s: &str) -> AppResult<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(AppError::InvalidTimestamp(s.to_string()))
}

/// Resolve the optional `--at` override: absent means "now". Every clocked
/// operation goes through here so tests can pin the clock.
pub fn resolve_at(at: Option<&String>) -> AppResult<DateTime<Utc>> {
    match at {
        Some(s) => parse_at(s),
        None => Ok(Utc::now()),
    }
}

/// Compact display form, minute precision.
pub fn format_ts(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_opt_ts(t: Option<DateTime<Utc>>) -> String {
    match t {
        Some(t) => format_ts(t),
        None => "--:--".to_string(),
    }
}

pub fn format_minutes(mins: i64) -> String {
    let sign = if mins < 0 { "-" } else { "" };
    let m = mins.abs();
    format!("{}{:02}:{:02}", sign, m / 60, m % 60)
}
