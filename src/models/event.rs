use crate::models::source::SessionSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw location fix attached to an event or sampled by the watchdog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    /// Reported accuracy radius in meters (lower is better).
    pub accuracy_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceAction {
    Enter,
    Exit,
}

impl FenceAction {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            FenceAction::Enter => "enter",
            FenceAction::Exit => "exit",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "enter" => Some(FenceAction::Enter),
            "exit" => Some(FenceAction::Exit),
            _ => None,
        }
    }
}

/// Normalized geofence signal. Both the foreground listener and the headless
/// entry point produce this same shape; they differ only in `source`.
///
/// `occurred_at` is the OS-reported occurrence time and is never overwritten
/// with "now" — delivery delay is measured via `received_at`, not hidden.
#[derive(Debug, Clone)]
pub struct GeofenceEvent {
    pub action: FenceAction,
    pub fence_id: String,
    pub occurred_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub source: SessionSource,
    pub confidence: f64,
    pub fix: Option<LocationFix>,
}

impl GeofenceEvent {
    /// Event delivered by the foreground geofence listener.
    pub fn foreground(
        action: FenceAction,
        fence_id: &str,
        occurred_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
        fix: Option<LocationFix>,
    ) -> Self {
        Self {
            action,
            fence_id: fence_id.to_string(),
            occurred_at,
            received_at,
            source: SessionSource::Gps,
            confidence: 1.0,
            fix,
        }
    }

    /// Event delivered by the process-independent headless entry point.
    pub fn headless(
        action: FenceAction,
        fence_id: &str,
        occurred_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
        fix: Option<LocationFix>,
    ) -> Self {
        Self {
            source: SessionSource::Headless,
            ..Self::foreground(action, fence_id, occurred_at, received_at, fix)
        }
    }

    /// Event synthesized internally (watchdog, recovery, session guard).
    /// These carry reduced confidence chosen by the synthesizer.
    pub fn synthetic(
        action: FenceAction,
        fence_id: &str,
        at: DateTime<Utc>,
        confidence: f64,
        fix: Option<LocationFix>,
    ) -> Self {
        Self {
            action,
            fence_id: fence_id.to_string(),
            occurred_at: at,
            received_at: at,
            source: SessionSource::Gps,
            confidence,
            fix,
        }
    }

    /// Delivery delay between the OS-reported occurrence and our receipt.
    pub fn delay_secs(&self) -> i64 {
        (self.received_at - self.occurred_at).num_seconds().max(0)
    }
}
