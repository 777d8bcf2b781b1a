//! Terminal stand-ins for the mobile platform collaborators. The CLI feeds
//! fixes through flags; mode switches and notifications become visible,
//! assertable output lines.

use crate::errors::{AppError, AppResult};
use crate::models::event::LocationFix;
use crate::models::location::GeofenceLocation;
use crate::models::tracking::TrackingMode;
use crate::platform::{GeofencePlatform, LocationProvider, Notifier};
use crate::ui::messages::info;

/// Returns the fix passed on the command line, or fails like a GPS timeout
/// when none was given.
pub struct CliFixProvider {
    pub fix: Option<LocationFix>,
}

impl LocationProvider for CliFixProvider {
    fn current_fix(&self) -> AppResult<LocationFix> {
        self.fix.ok_or(AppError::FixUnavailable)
    }
}

pub struct TerminalPlatform;

impl GeofencePlatform for TerminalPlatform {
    fn set_mode(&self, mode: TrackingMode) -> AppResult<()> {
        info(format!("Tracking mode → {}", mode.to_db_str()));
        Ok(())
    }

    fn register_fences(&self, fences: &[GeofenceLocation]) -> AppResult<()> {
        info(format!(
            "Registered {} fence(s) with the location stack",
            fences.len()
        ));
        Ok(())
    }
}

pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, title: &str, body: &str) -> AppResult<()> {
        println!("🔔 {title}: {body}");
        Ok(())
    }
}
