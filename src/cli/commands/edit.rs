use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::effects::EffectsLogic;
use crate::core::usecases::{SessionEdit, UseCaseLogic};
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::models::source::SessionSource;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::time::{parse_at, resolve_at};

/// Handle `edit`: a manual field change on one session. Manual edits pin
/// confidence to 1.0 and outrank anything a sensor wrote.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Edit {
        id,
        enter,
        exit,
        break_min,
        notes,
        at,
    } = cmd
    else {
        return Ok(());
    };

    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    let edit = SessionEdit {
        enter_at: match enter {
            Some(raw) => Some(parse_at(raw)?),
            None => None,
        },
        exit_at: match exit {
            Some(raw) => Some(parse_at(raw)?),
            None => None,
        },
        break_min: *break_min,
        notes: notes.clone(),
    };

    let session = UseCaseLogic::edit_session(&mut pool, id, &edit, SessionSource::Manual, now)?;

    messages::success(format!("Session {} updated.", &session.id));
    if let Some(m) = session.duration_min {
        messages::kv("total", format!("{} min", m));
    }

    let env = AppEnv::cli(None);
    EffectsLogic::drain(&mut pool, cfg, &env, now)?;

    Ok(())
}
