use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::watchdog::{FixOutcome, WatchdogLogic};
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::models::event::LocationFix;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::time::resolve_at;

/// Handle `heartbeat`: one watchdog pass over cooldowns, the effects queue,
/// the session guard and the location fix check.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Heartbeat {
        at,
        lat,
        lng,
        accuracy,
    } = cmd
    else {
        return Ok(());
    };

    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    let fix = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(LocationFix {
            lat: *lat,
            lng: *lng,
            accuracy_m: accuracy.unwrap_or(10.0),
        }),
        _ => None,
    };
    let env = AppEnv::cli(fix);

    let report = WatchdogLogic::tick(&mut pool, cfg, &env, now)?;

    if report.cooldown_confirmed {
        messages::tracking("A pending exit was confirmed (cooldown elapsed).");
    }
    if report.forced > 0 {
        messages::warning(format!(
            "{} runaway session(s) force-closed by the guard.",
            report.forced
        ));
    }
    if report.warned > 0 {
        messages::info(format!(
            "{} long session(s) warned, still running.",
            report.warned
        ));
    }

    match report.fix {
        FixOutcome::NotTracking => {}
        FixOutcome::Unavailable => messages::info("Fix check inconclusive (no usable fix)."),
        FixOutcome::Inside => messages::info("Fix check: inside the tracked fence."),
        FixOutcome::Outside(n) => {
            messages::warning(format!("Fix check: outside the tracked fence ({} in a row).", n));
        }
        FixOutcome::ExitSynthesized => {
            messages::tracking("Two consecutive readings outside: exit synthesized.");
        }
    }

    if report.effects.executed > 0 || report.effects.retried > 0 || report.effects.dead > 0 {
        messages::info(format!(
            "Queue drain: {} executed, {} retried, {} dead.",
            report.effects.executed, report.effects.retried, report.effects.dead
        ));
    }

    Ok(())
}
