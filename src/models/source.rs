use serde::{Deserialize, Serialize};

/// Who produced a session or an edit to one. The ordering returned by
/// [`SessionSource::priority`] encodes the product rule used everywhere a
/// conflict is resolved: a worker's explicit statement outranks an automatic
/// inference, and an automatic correction outranks a raw sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    Gps,
    Headless,
    Manual,
    Voice,
    Secretary,
}

impl SessionSource {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SessionSource::Gps => "gps",
            SessionSource::Headless => "headless",
            SessionSource::Manual => "manual",
            SessionSource::Voice => "voice",
            SessionSource::Secretary => "secretary",
        }
    }

    /// Convert DB string → enum. Remote rows may carry legacy aliases
    /// ("sdk" for gps-tier, "edited" for manual-tier).
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "gps" | "sdk" => Some(SessionSource::Gps),
            "headless" => Some(SessionSource::Headless),
            "manual" | "edited" => Some(SessionSource::Manual),
            "voice" => Some(SessionSource::Voice),
            "secretary" => Some(SessionSource::Secretary),
            _ => None,
        }
    }

    /// Fixed conflict ranking, highest wins:
    /// voice(4) > manual(3) > secretary(2) > gps/headless(1).
    pub fn priority(&self) -> u8 {
        match self {
            SessionSource::Voice => 4,
            SessionSource::Manual => 3,
            SessionSource::Secretary => 2,
            SessionSource::Gps | SessionSource::Headless => 1,
        }
    }

    /// Human tiers (manual, voice) are direct worker statements.
    pub fn is_human(&self) -> bool {
        matches!(self, SessionSource::Manual | SessionSource::Voice)
    }
}
