use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::usecases::UseCaseLogic;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::ui::messages;
use crate::utils::time::{format_ts, resolve_at};

/// Handle `resume`: fold the elapsed pause into the break total.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Resume { at } = cmd {
        let now = resolve_at(at.as_ref())?;
        let mut pool = DbPool::new(&cfg.database)?;

        let session = UseCaseLogic::resume(&mut pool, cfg, now, now)?;
        messages::success(format!("Session resumed at {}.", format_ts(now)));
        messages::kv("session", &session.id);
        messages::kv("break", format!("{} min", session.break_secs / 60));
    }
    Ok(())
}
