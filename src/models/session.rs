use crate::models::source::SessionSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_meta() -> serde_json::Value {
    serde_json::json!({})
}

/// One work interval: presence inside a single fence from `enter_at` until
/// `exit_at`. A NULL `exit_at` means the session is still open; the
/// persistence layer guarantees at most one open session per user.
///
/// The serde shape doubles as the sync wire format; `synced`/`synced_at`
/// are local bookkeeping and get overwritten on download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: String,                     // ⇔ work_sessions.id (TEXT, uuid v4)
    pub user_id: String,                // ⇔ work_sessions.user_id
    pub location_id: Option<String>,    // ⇔ work_sessions.location_id
    pub location_name: Option<String>,  // ⇔ work_sessions.location_name
    pub enter_at: DateTime<Utc>,        // ⇔ work_sessions.enter_at (RFC3339)
    pub exit_at: Option<DateTime<Utc>>, // ⇔ work_sessions.exit_at (NULL = open)
    pub break_secs: i64,                // ⇔ work_sessions.break_secs
    pub duration_min: Option<i64>,      // ⇔ work_sessions.duration_min (NULL until closed)
    pub source: SessionSource,          // ⇔ work_sessions.source
    pub confidence: f64,                // ⇔ work_sessions.confidence (0..=1)
    #[serde(default)]
    pub notes: String,                  // ⇔ work_sessions.notes
    #[serde(default = "default_meta")]
    pub meta: serde_json::Value,        // ⇔ work_sessions.meta (JSON object)
    #[serde(default)]
    pub deleted: bool,                  // ⇔ work_sessions.deleted (soft delete)
    #[serde(default)]
    pub synced: bool,                   // ⇔ work_sessions.synced (dirty flag)
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>, // ⇔ work_sessions.synced_at (NULL = remote never saw it)
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkSession {
    /// New open session as created by the tracking engine on a fence entry.
    pub fn open(
        user_id: &str,
        location_id: Option<String>,
        location_name: Option<String>,
        enter_at: DateTime<Utc>,
        source: SessionSource,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            location_id,
            location_name,
            enter_at,
            exit_at: None,
            break_secs: 0,
            duration_min: None,
            source,
            confidence: confidence.clamp(0.0, 1.0),
            notes: String::new(),
            meta: serde_json::json!({}),
            deleted: false,
            synced: false,
            synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_at.is_none() && !self.deleted
    }

    /// Day key of the session (UTC date of the enter timestamp, "YYYY-MM-DD").
    pub fn day_key(&self) -> String {
        self.enter_at.format("%Y-%m-%d").to_string()
    }

    /// Net worked minutes between enter and `exit_at`, pauses subtracted.
    pub fn net_minutes(&self, exit_at: DateTime<Utc>) -> i64 {
        let gross = (exit_at - self.enter_at).num_seconds();
        ((gross - self.break_secs).max(0)) / 60
    }

    /// In-progress pause marker stashed in `meta` by the pause use case.
    pub fn pause_started_at(&self) -> Option<DateTime<Utc>> {
        self.meta
            .get("pause_started_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_pause_started_at(&mut self, at: Option<DateTime<Utc>>) {
        if let Some(obj) = self.meta.as_object_mut() {
            match at {
                Some(ts) => {
                    obj.insert(
                        "pause_started_at".to_string(),
                        serde_json::Value::String(ts.to_rfc3339()),
                    );
                }
                None => {
                    obj.remove("pause_started_at");
                }
            }
        }
    }

    /// Confidence of the exit signal waiting out its cooldown. Stashed here
    /// so a low-confidence synthesized exit still lowers the session
    /// confidence when the cooldown confirms it later.
    pub fn pending_exit_confidence(&self) -> Option<f64> {
        self.meta.get("pending_exit_confidence").and_then(|v| v.as_f64())
    }

    pub fn set_pending_exit_confidence(&mut self, conf: Option<f64>) {
        if let Some(obj) = self.meta.as_object_mut() {
            match conf.and_then(serde_json::Number::from_f64) {
                Some(n) => {
                    obj.insert(
                        "pending_exit_confidence".to_string(),
                        serde_json::Value::Number(n),
                    );
                }
                None => {
                    obj.remove("pending_exit_confidence");
                }
            }
        }
    }

    /// Absence kind for marker sessions created by `mark_day_type`
    /// (e.g. "sick", "vacation"). None for regular work sessions.
    pub fn day_type(&self) -> Option<String> {
        self.meta
            .get("day_type")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn set_day_type(&mut self, kind: &str) {
        if let Some(obj) = self.meta.as_object_mut() {
            obj.insert(
                "day_type".to_string(),
                serde_json::Value::String(kind.to_string()),
            );
        }
    }

    pub fn meta_str(&self) -> String {
        self.meta.to_string()
    }
}
