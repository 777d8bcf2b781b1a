use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit/undo record for one automated edit: which field of which session
/// changed, from what to what, and why. Kept so any AI edit can be rolled
/// back exactly; `reverted` flips when the undo path restores the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCorrection {
    pub id: String,              // ⇔ ai_corrections.id (TEXT, uuid v4)
    pub session_id: String,      // ⇔ ai_corrections.session_id
    pub user_id: String,         // ⇔ ai_corrections.user_id
    pub field: String,           // ⇔ ai_corrections.field
    pub original_value: Option<String>,
    pub corrected_value: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub reverted: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiCorrection {
    pub fn new(
        session_id: &str,
        user_id: &str,
        field: &str,
        original_value: Option<String>,
        corrected_value: Option<String>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            field: field.to_string(),
            original_value,
            corrected_value,
            reason: reason.to_string(),
            reverted: false,
            deleted: false,
            synced: false,
            synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
