//! External collaborator seams: the location stack, the OS geofence mirror
//! and the notification sink live behind traits so the engine, watchdog and
//! recovery run identically under the mobile shell and under the CLI
//! harness.

pub mod sim;

use crate::errors::AppResult;
use crate::models::event::LocationFix;
use crate::models::location::GeofenceLocation;
use crate::models::tracking::TrackingMode;

/// One-shot location fix source. Implementations must be bounded in time;
/// an `Err` means the attempt failed (timeout, no signal) and is treated as
/// inconclusive by callers, never as "outside".
pub trait LocationProvider {
    fn current_fix(&self) -> AppResult<LocationFix>;
}

/// The OS geofencing layer: a mode switch (fix frequency) and a mirror of
/// the monitored circles.
pub trait GeofencePlatform {
    fn set_mode(&self, mode: TrackingMode) -> AppResult<()>;
    fn register_fences(&self, fences: &[GeofenceLocation]) -> AppResult<()>;
}

/// Push notification sink.
pub trait Notifier {
    fn notify(&self, title: &str, body: &str) -> AppResult<()>;
}

/// The bundle of platform collaborators handed to the engine-adjacent code.
pub struct AppEnv {
    pub location: Box<dyn LocationProvider>,
    pub platform: Box<dyn GeofencePlatform>,
    pub notifier: Box<dyn Notifier>,
}

impl AppEnv {
    /// CLI harness environment: the fix (if any) comes from command-line
    /// flags, mode switches and notifications print to the terminal.
    pub fn cli(fix: Option<LocationFix>) -> Self {
        Self {
            location: Box::new(sim::CliFixProvider { fix }),
            platform: Box::new(sim::TerminalPlatform),
            notifier: Box::new(sim::TerminalNotifier),
        }
    }
}
