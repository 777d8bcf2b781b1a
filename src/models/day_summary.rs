use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Derived per-user/per-day aggregate. Never a source of truth: rebuilt in
/// full from `work_sessions` every time a session in that day changes, and
/// safe to delete at any point.
///
/// `source_mix` uses a BTreeMap so the serialized JSON is byte-identical
/// across rebuilds of the same input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySummary {
    pub id: String,               // ⇔ day_summaries.id (TEXT, uuid v4)
    pub user_id: String,          // ⇔ day_summaries.user_id
    /// "YYYY-MM-DD". Sent as `day` on the wire; `date` is reserved on the
    /// backend.
    #[serde(rename = "day")]
    pub date: String,             // ⇔ day_summaries.date
    pub total_min: i64,           // ⇔ day_summaries.total_min
    pub break_min: i64,           // ⇔ day_summaries.break_min
    pub first_enter: Option<DateTime<Utc>>, // ⇔ day_summaries.first_enter
    pub last_exit: Option<DateTime<Utc>>,   // ⇔ day_summaries.last_exit
    pub session_count: i64,       // ⇔ day_summaries.session_count
    pub primary_location: Option<String>,   // location with the most minutes
    #[serde(default)]
    pub source_mix: BTreeMap<String, f64>,  // source → fraction of minutes
    #[serde(default)]
    pub flags: Vec<String>,       // overtime | no_break | early_departure | ai_corrected | absence:<kind>
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DaySummary {
    pub fn source_mix_json(&self) -> String {
        serde_json::to_string(&self.source_mix).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn flags_json(&self) -> String {
        serde_json::to_string(&self.flags).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// Flag names used in `DaySummary::flags`.
pub mod flags {
    pub const OVERTIME: &str = "overtime";
    pub const NO_BREAK: &str = "no_break";
    pub const EARLY_DEPARTURE: &str = "early_departure";
    pub const AI_CORRECTED: &str = "ai_corrected";
    /// Absence markers are namespaced: `absence:sick`, `absence:vacation`, ...
    pub const ABSENCE_PREFIX: &str = "absence:";
}
