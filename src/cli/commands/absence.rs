use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::effects::EffectsLogic;
use crate::core::usecases::UseCaseLogic;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::date::parse_date;
use crate::utils::time::resolve_at;

/// Handle `absence`: mark a whole day as sick, vacation, holiday, ...
/// The marker is a zero-minute session so it syncs like everything else.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Absence { date, kind, at } = cmd {
        let day = parse_date(date)?;
        let now = resolve_at(at.as_ref())?;
        let mut pool = DbPool::new(&cfg.database)?;

        UseCaseLogic::mark_day_type(&mut pool, cfg, day, kind, now)?;
        messages::success(format!("{} marked as '{}'.", day, kind));

        let env = AppEnv::cli(None);
        EffectsLogic::drain(&mut pool, cfg, &env, now)?;
    }
    Ok(())
}
