use crate::errors::{AppError, AppResult};
use crate::models::tracking::TrackingMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Classification driving the retry policy: critical effects are retried
/// forever on a backoff ladder, normal effects dead-letter after three
/// strikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPriority {
    Critical,
    Normal,
}

impl EffectPriority {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            EffectPriority::Critical => "critical",
            EffectPriority::Normal => "normal",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(EffectPriority::Critical),
            "normal" => Some(EffectPriority::Normal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStatus {
    Pending,
    Done,
    Failed,
}

impl EffectStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            EffectStatus::Pending => "pending",
            EffectStatus::Done => "done",
            EffectStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EffectStatus::Pending),
            "done" => Some(EffectStatus::Done),
            "failed" => Some(EffectStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    SwitchMode,
    RebuildDaySummary,
    StartSessionGuard,
    CancelSessionGuard,
    SyncNow,
    AiCleanup,
    UiRefresh,
    Notify,
    SyncFences,
    FenceSettleProbe,
}

impl EffectKind {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            EffectKind::SwitchMode => "switch_mode",
            EffectKind::RebuildDaySummary => "rebuild_day_summary",
            EffectKind::StartSessionGuard => "start_session_guard",
            EffectKind::CancelSessionGuard => "cancel_session_guard",
            EffectKind::SyncNow => "sync_now",
            EffectKind::AiCleanup => "ai_cleanup",
            EffectKind::UiRefresh => "ui_refresh",
            EffectKind::Notify => "notify",
            EffectKind::SyncFences => "sync_fences",
            EffectKind::FenceSettleProbe => "fence_settle_probe",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "switch_mode" => Some(EffectKind::SwitchMode),
            "rebuild_day_summary" => Some(EffectKind::RebuildDaySummary),
            "start_session_guard" => Some(EffectKind::StartSessionGuard),
            "cancel_session_guard" => Some(EffectKind::CancelSessionGuard),
            "sync_now" => Some(EffectKind::SyncNow),
            "ai_cleanup" => Some(EffectKind::AiCleanup),
            "ui_refresh" => Some(EffectKind::UiRefresh),
            "notify" => Some(EffectKind::Notify),
            "sync_fences" => Some(EffectKind::SyncFences),
            "fence_settle_probe" => Some(EffectKind::FenceSettleProbe),
            _ => None,
        }
    }

    /// Pre-classified priority: losing a sync, a summary rebuild or an AI
    /// cleanup corrupts derived data, so those retry forever.
    pub fn priority(&self) -> EffectPriority {
        match self {
            EffectKind::SyncNow | EffectKind::RebuildDaySummary | EffectKind::AiCleanup => {
                EffectPriority::Critical
            }
            _ => EffectPriority::Normal,
        }
    }
}

/// One row of the durable effects queue, payload still raw. The payload is
/// decoded into an [`EffectRequest`] at dequeue time, never trusted blindly.
#[derive(Debug, Clone)]
pub struct QueuedEffect {
    pub id: i64,                        // ⇔ effects_queue.id (AUTOINCREMENT, drain order)
    pub kind: EffectKind,               // ⇔ effects_queue.kind
    pub payload: serde_json::Value,     // ⇔ effects_queue.payload (JSON)
    pub status: EffectStatus,           // ⇔ effects_queue.status
    pub attempts: i64,                  // ⇔ effects_queue.attempts
    pub priority: EffectPriority,       // ⇔ effects_queue.priority
    pub run_after: Option<DateTime<Utc>>, // ⇔ effects_queue.run_after (NULL = eligible now)
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueuedEffect {
    pub fn eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == EffectStatus::Pending && self.run_after.is_none_or(|t| t <= now)
    }

    pub fn decode(&self) -> AppResult<EffectRequest> {
        EffectRequest::decode(self.kind, &self.payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryScope {
    pub user_id: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardStart {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Strongly-typed effect, one variant per kind. What the engine enqueues
/// and what the drain dispatches on.
#[derive(Debug, Clone)]
pub enum EffectRequest {
    SwitchMode(TrackingMode),
    RebuildDaySummary(SummaryScope),
    StartSessionGuard(GuardStart),
    CancelSessionGuard { session_id: String },
    SyncNow,
    AiCleanup(SummaryScope),
    UiRefresh,
    Notify(Notification),
    SyncFences,
    FenceSettleProbe { fence_id: String },
}

impl EffectRequest {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectRequest::SwitchMode(_) => EffectKind::SwitchMode,
            EffectRequest::RebuildDaySummary(_) => EffectKind::RebuildDaySummary,
            EffectRequest::StartSessionGuard(_) => EffectKind::StartSessionGuard,
            EffectRequest::CancelSessionGuard { .. } => EffectKind::CancelSessionGuard,
            EffectRequest::SyncNow => EffectKind::SyncNow,
            EffectRequest::AiCleanup(_) => EffectKind::AiCleanup,
            EffectRequest::UiRefresh => EffectKind::UiRefresh,
            EffectRequest::Notify(_) => EffectKind::Notify,
            EffectRequest::SyncFences => EffectKind::SyncFences,
            EffectRequest::FenceSettleProbe { .. } => EffectKind::FenceSettleProbe,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            EffectRequest::SwitchMode(mode) => json!({ "mode": mode.to_db_str() }),
            EffectRequest::RebuildDaySummary(scope) | EffectRequest::AiCleanup(scope) => {
                serde_json::to_value(scope).unwrap_or_else(|_| json!({}))
            }
            EffectRequest::StartSessionGuard(start) => {
                serde_json::to_value(start).unwrap_or_else(|_| json!({}))
            }
            EffectRequest::CancelSessionGuard { session_id } => {
                json!({ "session_id": session_id })
            }
            EffectRequest::Notify(n) => serde_json::to_value(n).unwrap_or_else(|_| json!({})),
            EffectRequest::FenceSettleProbe { fence_id } => json!({ "fence_id": fence_id }),
            EffectRequest::SyncNow | EffectRequest::UiRefresh | EffectRequest::SyncFences => {
                json!({})
            }
        }
    }

    pub fn decode(kind: EffectKind, payload: &serde_json::Value) -> AppResult<EffectRequest> {
        let req = match kind {
            EffectKind::SwitchMode => {
                let mode = payload
                    .get("mode")
                    .and_then(|v| v.as_str())
                    .and_then(TrackingMode::from_db_str)
                    .ok_or_else(|| AppError::InvalidEffect(format!("bad mode: {payload}")))?;
                EffectRequest::SwitchMode(mode)
            }
            EffectKind::RebuildDaySummary => {
                EffectRequest::RebuildDaySummary(serde_json::from_value(payload.clone())?)
            }
            EffectKind::StartSessionGuard => {
                EffectRequest::StartSessionGuard(serde_json::from_value(payload.clone())?)
            }
            EffectKind::CancelSessionGuard => EffectRequest::CancelSessionGuard {
                session_id: payload
                    .get("session_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        AppError::InvalidEffect(format!("bad guard payload: {payload}"))
                    })?
                    .to_string(),
            },
            EffectKind::SyncNow => EffectRequest::SyncNow,
            EffectKind::AiCleanup => {
                EffectRequest::AiCleanup(serde_json::from_value(payload.clone())?)
            }
            EffectKind::UiRefresh => EffectRequest::UiRefresh,
            EffectKind::Notify => EffectRequest::Notify(serde_json::from_value(payload.clone())?),
            EffectKind::SyncFences => EffectRequest::SyncFences,
            EffectKind::FenceSettleProbe => EffectRequest::FenceSettleProbe {
                fence_id: payload
                    .get("fence_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        AppError::InvalidEffect(format!("bad probe payload: {payload}"))
                    })?
                    .to_string(),
            },
        };
        Ok(req)
    }
}
