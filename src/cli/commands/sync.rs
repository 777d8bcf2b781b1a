use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::pool::DbPool;
use crate::db::{queue, sync_state};
use crate::errors::AppResult;
use crate::models::effect::EffectRequest;
use crate::sync::engine::SyncEngine;
use crate::ui::messages;
use crate::utils::time::resolve_at;

/// Handle `sync`: one bidirectional cycle against the configured backend.
/// An unreachable backend is not an error here; the cycle is queued and
/// the next drain retries it on the short offline rung.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Sync { full, at } = cmd else {
        return Ok(());
    };

    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    if *full {
        sync_state::reset(&pool.conn)?;
        messages::info("Watermarks cleared, pulling the full backend state.");
    }

    let report = match SyncEngine::run(&mut pool, cfg, now) {
        Ok(report) => report,
        Err(e) if e.is_offline() => {
            queue::enqueue(&pool.conn, &EffectRequest::SyncNow, now)?;
            messages::warning("Backend unreachable. Sync queued, it retries on the next drain.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if report.disabled {
        messages::warning("Sync is disabled or no backend is configured (see `config --print`).");
        return Ok(());
    }
    if report.skipped {
        messages::info("Another sync cycle is already running, nothing to do.");
        return Ok(());
    }

    messages::success(format!(
        "Sync complete: {} uploaded, {} downloaded.",
        report.uploaded, report.downloaded
    ));
    if report.purged > 0 {
        messages::kv("purged", report.purged);
    }
    for e in &report.errors {
        messages::warning(e);
    }

    Ok(())
}
