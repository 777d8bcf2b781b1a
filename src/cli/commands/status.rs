use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::pool::DbPool;
use crate::db::{queue, sessions, tracking};
use crate::errors::AppResult;
use crate::ui::messages;
use crate::utils::colors::{RESET, color_for_status};
use crate::utils::time::{format_opt_ts, format_ts};
use chrono::Utc;

/// Handle `status`: tracking cursor, open session, queue depth and sync
/// configuration at a glance.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if !matches!(cmd, Commands::Status) {
        return Ok(());
    }

    let pool = DbPool::new(&cfg.database)?;
    let cursor = tracking::load_cursor(&pool.conn)?;
    let open = sessions::find_open_session(&pool.conn, &cfg.user_id)?;
    let pending = queue::pending_count(&pool.conn)?;

    let status = cursor.status.to_db_str();
    println!(
        "📍 Tracking: {}{}{}",
        color_for_status(status),
        status,
        RESET
    );

    if let Some(name) = &cursor.fence_name {
        messages::kv("fence", name);
    }
    if let Some(t) = cursor.entered_at {
        messages::kv("entered", format_ts(t));
    }
    if let Some(t) = cursor.pending_exit_at {
        messages::kv("exit pending", format_ts(t));
    }
    if let Some(t) = cursor.cooldown_until {
        messages::kv("cooldown until", format_ts(t));
    }

    match &open {
        Some(s) => {
            messages::kv("session", &s.id);
            messages::kv("since", format_ts(s.enter_at));
            messages::kv("elapsed", format!("{} min", s.net_minutes(Utc::now())));
            if s.break_secs > 0 {
                messages::kv("break", format!("{} min", s.break_secs / 60));
            }
            if s.pause_started_at().is_some() {
                messages::kv("paused since", format_opt_ts(s.pause_started_at()));
            }
        }
        None => messages::kv("session", "--"),
    }

    messages::kv("queued effects", pending);
    messages::kv(
        "sync",
        if cfg.sync_configured() {
            "configured"
        } else {
            "off"
        },
    );
    messages::kv(
        "ai",
        if cfg.ai_configured() {
            "configured"
        } else {
            "off"
        },
    );

    Ok(())
}
