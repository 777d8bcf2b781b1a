//! Shared row-conversion helpers for the query modules.
//!
//! Timestamps are stored as RFC 3339 strings normalized to second precision
//! and a `Z` suffix, so lexicographic comparison in SQL matches
//! chronological order.

use crate::errors::AppError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

/// DateTime → DB string ("2025-03-10T09:00:00Z").
pub fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn opt_ts(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(ts)
}

/// DB string → DateTime, wrapping bad data the way rusqlite expects.
pub fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                Box::new(AppError::InvalidTimestamp(s.to_string())),
            )
        })
}

pub fn parse_opt_ts(s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match s {
        Some(s) => Ok(Some(parse_ts(&s)?)),
        None => Ok(None),
    }
}

/// Wrap a domain conversion failure (bad enum string, bad JSON) so it
/// surfaces through rusqlite's error channel with the offending value.
pub fn bad_value(err: AppError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err))
}
