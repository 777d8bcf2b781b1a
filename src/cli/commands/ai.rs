use crate::cli::parser::{AiCmd, Commands};
use crate::config::Config;
use crate::core::ai::AiLogic;
use crate::core::effects::EffectsLogic;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::date::{parse_date, today};
use crate::utils::time::resolve_at;

/// Handle `ai cleanup`: ask the secretary endpoint to tidy up one day's
/// closed sessions. Every applied suggestion leaves an undoable correction.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Ai { action } = cmd else {
        return Ok(());
    };

    let AiCmd::Cleanup { date, at } = action;

    let day = match date {
        Some(raw) => parse_date(raw)?,
        None => today(),
    };
    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    if !cfg.ai_configured() {
        messages::warning("No AI endpoint configured (set ai_url in the config).");
        return Ok(());
    }

    let report = AiLogic::run_cleanup(&mut pool, cfg, &cfg.user_id, day, now)?;

    messages::success(format!(
        "Cleanup for {}: {} suggested, {} applied, {} skipped.",
        day, report.suggested, report.applied, report.skipped
    ));
    for f in &report.failures {
        messages::warning(f);
    }
    if report.applied > 0 {
        messages::info("Use `undo <correction-id>` to revert a correction.");
    }

    let env = AppEnv::cli(None);
    EffectsLogic::drain(&mut pool, cfg, &env, now)?;

    Ok(())
}
