use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::effects::EffectsLogic;
use crate::core::usecases::UseCaseLogic;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::time::resolve_at;

/// Handle `undo`: revert one AI correction, restoring the value it
/// overwrote.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Undo { id, at } = cmd {
        let now = resolve_at(at.as_ref())?;
        let mut pool = DbPool::new(&cfg.database)?;

        let correction = UseCaseLogic::undo_correction(&mut pool, id, now)?;

        messages::success(format!(
            "Correction {} undone on session {}.",
            correction.id, correction.session_id
        ));
        messages::kv("field", &correction.field);
        messages::kv(
            "restored",
            correction.original_value.as_deref().unwrap_or("--"),
        );

        let env = AppEnv::cli(None);
        EffectsLogic::drain(&mut pool, cfg, &env, now)?;
    }
    Ok(())
}
