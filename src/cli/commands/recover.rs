use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::effects::EffectsLogic;
use crate::core::recovery::{BootOutcome, RecoveryLogic};
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::models::event::LocationFix;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::time::resolve_at;

/// Handle `recover`: the cold-start reconciliation pass, with an optional
/// location probe standing in for what the mobile app reads at boot.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Recover {
        at,
        probe_lat,
        probe_lng,
        accuracy,
    } = cmd
    else {
        return Ok(());
    };

    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    let fix = match (probe_lat, probe_lng) {
        (Some(lat), Some(lng)) => Some(LocationFix {
            lat: *lat,
            lng: *lng,
            accuracy_m: accuracy.unwrap_or(10.0),
        }),
        _ => None,
    };
    let env = AppEnv::cli(fix);

    let report = RecoveryLogic::boot(&mut pool, cfg, &env, now)?;

    if report.cooldown_confirmed {
        messages::tracking("A pending exit was confirmed (cooldown elapsed while down).");
    }

    match report.outcome {
        BootOutcome::Clean => messages::success("Tracking state is consistent."),
        BootOutcome::Rehydrated { session_id } => {
            messages::tracking("Cursor rebuilt from the open session.");
            messages::kv("session", session_id);
        }
        BootOutcome::CursorReset => {
            messages::warning("Cursor pointed at a closed or missing session, reset to IDLE.");
        }
        BootOutcome::EnterSynthesized { fence_name } => {
            messages::tracking(format!("Probe landed inside '{}', session opened.", fence_name));
        }
    }

    // Anything the dead process left queued runs now.
    let drained = EffectsLogic::drain(&mut pool, cfg, &env, now)?;
    if drained.executed > 0 {
        messages::info(format!("{} queued effect(s) executed.", drained.executed));
    }

    Ok(())
}
