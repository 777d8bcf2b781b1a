use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::effects::EffectsLogic;
use crate::core::usecases::UseCaseLogic;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::platform::AppEnv;
use crate::ui::messages::{info, success, warning};
use crate::utils::time::resolve_at;

use std::io::{self, Write};

/// Ask a yes/no confirmation from the user
fn ask_confirmation(prompt: &str) -> bool {
    warning(prompt);
    print!("Confirm [y/N]: ");
    let _ = io::stdout().flush();

    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        matches!(s.trim().to_lowercase().as_str(), "y" | "yes")
    } else {
        false
    }
}

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Del { id, at } = cmd {
        let now = resolve_at(at.as_ref())?;

        //
        // Confirmation prompt
        //
        let prompt = format!(
            "Delete session {}? The deletion propagates to the backend on the next sync.",
            id
        );

        if !ask_confirmation(&prompt) {
            info("Operation cancelled.");
            return Ok(());
        }

        //
        // Execute deletion (tombstone + day summary rebuild via the queue)
        //
        let mut pool = DbPool::new(&cfg.database)?;
        UseCaseLogic::delete_session(&mut pool, id, now)?;
        success(format!("Session {} has been deleted.", id));

        let env = AppEnv::cli(None);
        EffectsLogic::drain(&mut pool, cfg, &env, now)?;
    }

    Ok(())
}
