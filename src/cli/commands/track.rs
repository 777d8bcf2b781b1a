use crate::cli::parser::{Commands, TrackCmd};
use crate::config::Config;
use crate::core::effects::EffectsLogic;
use crate::core::engine::{Decision, EngineLogic};
use crate::core::usecases::resolve_fence;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::models::event::{FenceAction, GeofenceEvent, LocationFix};
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::time::{format_ts, resolve_at};

/// Handle `track enter` / `track exit`: one geofence transition through the
/// engine, then a queue drain so the enqueued effects run right away.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Track { action } = cmd else {
        return Ok(());
    };

    let (fence_action, fence, at, lat, lng, accuracy, headless) = match action {
        TrackCmd::Enter {
            fence,
            at,
            lat,
            lng,
            accuracy,
            headless,
        } => (FenceAction::Enter, fence, at, lat, lng, accuracy, headless),
        TrackCmd::Exit {
            fence,
            at,
            lat,
            lng,
            accuracy,
            headless,
        } => (FenceAction::Exit, fence, at, lat, lng, accuracy, headless),
    };

    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    // Accetta sia l'id che il nome del fence.
    let target = resolve_fence(&pool.conn, &cfg.user_id, fence)?;

    let fix = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(LocationFix {
            lat: *lat,
            lng: *lng,
            accuracy_m: accuracy.unwrap_or(10.0),
        }),
        _ => None,
    };

    // Injected events carry no delivery delay.
    let ev = if *headless {
        GeofenceEvent::headless(fence_action, &target.id, now, now, fix)
    } else {
        GeofenceEvent::foreground(fence_action, &target.id, now, now, fix)
    };

    let outcome = EngineLogic::handle_event(&mut pool, cfg, &ev, now)?;

    match outcome.decision {
        Decision::Open => {
            messages::tracking(format!("Entered '{}' at {}", target.name, format_ts(now)));
        }
        Decision::DuplicateEnter => {
            messages::info(format!(
                "Already tracking '{}', duplicate enter ignored.",
                target.name
            ));
        }
        Decision::IgnoredExitWhileIdle => {
            messages::warning(format!(
                "Exit for '{}' ignored: no session is being tracked.",
                target.name
            ));
        }
        Decision::StartCooldown => {
            messages::tracking(format!(
                "Exit from '{}' pending, confirming after the cooldown.",
                target.name
            ));
        }
        Decision::StaleExitOtherFence => {
            messages::warning(format!(
                "Stale exit for '{}' ignored: a different fence is being tracked.",
                target.name
            ));
        }
        Decision::SwitchFence => {
            messages::tracking(format!(
                "Switched to '{}', the previous session was closed.",
                target.name
            ));
        }
        Decision::CancelPendingExit => {
            messages::tracking(format!(
                "Re-entered '{}', the pending exit was cancelled.",
                target.name
            ));
        }
        Decision::ResetCooldown => {
            messages::info(format!("Cooldown restarted for '{}'.", target.name));
        }
        Decision::ConfirmThenEnter => {
            messages::tracking(format!(
                "Previous exit confirmed, now tracking '{}'.",
                target.name
            ));
        }
    }

    if let Some(id) = &outcome.session_id {
        messages::kv("session", id);
    }

    let env = AppEnv::cli(fix);
    let report = EffectsLogic::drain(&mut pool, cfg, &env, now)?;
    if report.executed > 0 {
        messages::info(format!("{} queued effect(s) executed.", report.executed));
    }

    Ok(())
}
