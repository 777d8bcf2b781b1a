//! Source-priority conflict resolution for downloaded rows.
//!
//! The rule is the same one the edit path enforces: a human statement
//! outranks an automated inference no matter which side wrote last.
//! Timestamps only break ties between equal-priority writers.

use crate::models::source::SessionSource;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

/// The fields a conflict is decided on. Rows without a source column
/// (fences) compare as equal priority and fall through to `updated_at`.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub source: Option<SessionSource>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(source: Option<SessionSource>, updated_at: DateTime<Utc>) -> Self {
        Self { source, updated_at }
    }

    fn priority(&self) -> u8 {
        self.source.map(|s| s.priority()).unwrap_or(0)
    }
}

/// Equal timestamps keep the local row, so replaying a download is a no-op.
pub fn resolve(local: &Candidate, remote: &Candidate) -> Winner {
    if local.priority() > remote.priority() {
        return Winner::Local;
    }
    if remote.priority() > local.priority() {
        return Winner::Remote;
    }
    if remote.updated_at > local.updated_at {
        Winner::Remote
    } else {
        Winner::Local
    }
}
