use chrono::{DateTime, Utc};

/// Engine state for the singleton tracking cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    Idle,
    Tracking,
    ExitPending,
}

impl TrackingStatus {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TrackingStatus::Idle => "IDLE",
            TrackingStatus::Tracking => "TRACKING",
            TrackingStatus::ExitPending => "EXIT_PENDING",
        }
    }

    /// Convert DB string → enum
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(TrackingStatus::Idle),
            "TRACKING" => Some(TrackingStatus::Tracking),
            "EXIT_PENDING" => Some(TrackingStatus::ExitPending),
            _ => None,
        }
    }
}

/// Power profile requested from the location stack. `Active` means frequent
/// fixes while a session is live, `Idle` means geofence-transitions-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Active,
    Idle,
}

impl TrackingMode {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TrackingMode::Active => "active",
            TrackingMode::Idle => "idle",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TrackingMode::Active),
            "idle" => Some(TrackingMode::Idle),
            _ => None,
        }
    }
}

/// The single "what the engine currently believes" row. A cache over
/// `work_sessions`: it must always be reconstructible from the open session
/// row (that is what boot recovery does), and it is only ever mutated inside
/// the same transaction as the session write it describes.
#[derive(Debug, Clone)]
pub struct ActiveTracking {
    pub status: TrackingStatus,          // ⇔ active_tracking.status
    pub session_id: Option<String>,      // ⇔ active_tracking.session_id
    pub fence_id: Option<String>,        // ⇔ active_tracking.fence_id
    pub fence_name: Option<String>,      // ⇔ active_tracking.fence_name
    pub entered_at: Option<DateTime<Utc>>, // ⇔ active_tracking.entered_at
    pub pending_exit_at: Option<DateTime<Utc>>, // ⇔ active_tracking.pending_exit_at
    pub cooldown_until: Option<DateTime<Utc>>, // ⇔ active_tracking.cooldown_until
    pub pause_secs: i64,                 // ⇔ active_tracking.pause_secs
    /// Consecutive "outside the fence" heartbeat readings. Advisory: resets
    /// freely and carries no durability guarantee beyond the next reading.
    pub outside_count: i64,              // ⇔ active_tracking.outside_count
    pub updated_at: DateTime<Utc>,
}

impl ActiveTracking {
    /// Cleared cursor (status IDLE, nothing referenced).
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            status: TrackingStatus::Idle,
            session_id: None,
            fence_id: None,
            fence_name: None,
            entered_at: None,
            pending_exit_at: None,
            cooldown_until: None,
            pause_secs: 0,
            outside_count: 0,
            updated_at: now,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == TrackingStatus::Idle
    }

    /// True once the exit-pending cooldown window has elapsed.
    pub fn cooldown_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == TrackingStatus::ExitPending
            && self.cooldown_until.is_some_and(|t| t <= now)
    }
}
