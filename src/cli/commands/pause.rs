use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::usecases::UseCaseLogic;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::ui::messages;
use crate::utils::time::{format_ts, resolve_at};

/// Handle `pause`: stop counting work time inside the open session.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Pause { at } = cmd {
        let now = resolve_at(at.as_ref())?;
        let mut pool = DbPool::new(&cfg.database)?;

        let session = UseCaseLogic::pause(&mut pool, cfg, now, now)?;
        messages::success(format!("Session paused at {}.", format_ts(now)));
        messages::kv("session", &session.id);
    }
    Ok(())
}
