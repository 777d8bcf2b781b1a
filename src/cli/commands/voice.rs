use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::ai::{AiLogic, VoiceOutcome};
use crate::core::effects::EffectsLogic;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::time::resolve_at;

/// Handle `voice`: interpret a transcript through the configured AI
/// endpoint and execute whatever action comes back.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Voice { transcript, at } = cmd else {
        return Ok(());
    };

    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    let outcome = AiLogic::dispatch_voice(&mut pool, cfg, transcript, now)?;

    match outcome {
        VoiceOutcome::Started(s) => {
            messages::tracking("Session started by voice.");
            messages::kv("session", &s.id);
        }
        VoiceOutcome::Stopped(s) => {
            messages::tracking("Session stopped by voice.");
            messages::kv("session", &s.id);
            if let Some(m) = s.duration_min {
                messages::kv("total", format!("{} min", m));
            }
        }
        VoiceOutcome::Paused => messages::success("Session paused."),
        VoiceOutcome::Resumed => messages::success("Session resumed."),
        VoiceOutcome::Updated(s) => {
            messages::success(format!("Session {} updated.", &s.id));
        }
        VoiceOutcome::Deleted(id) => {
            messages::success(format!("Session {} deleted.", id));
        }
        VoiceOutcome::Query(answer) | VoiceOutcome::Report(answer) => {
            println!("🗣️  {}", answer);
        }
        VoiceOutcome::LocationCreated(name) => {
            messages::success(format!("Fence '{}' registered.", name));
        }
        VoiceOutcome::LocationDeleted(name) => {
            messages::success(format!("Fence '{}' deleted.", name));
        }
        VoiceOutcome::DayMarked { date, kind } => {
            messages::success(format!("{} marked as '{}'.", date, kind));
        }
    }

    let env = AppEnv::cli(None);
    EffectsLogic::drain(&mut pool, cfg, &env, now)?;

    Ok(())
}
