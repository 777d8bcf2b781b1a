use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::effects::EffectsLogic;
use crate::db::pool::DbPool;
use crate::db::queue;
use crate::errors::AppResult;
use crate::models::effect::QueuedEffect;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::colors::{GREEN, GREY, RED, RESET, YELLOW};
use crate::utils::formatting::pad_right;
use crate::utils::time::{format_opt_ts, resolve_at};

const PRINT_LIMIT: usize = 50;

/// Handle `queue`: inspect the durable effects queue or drain it by hand.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Queue { print, drain, at } = cmd else {
        return Ok(());
    };

    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    if *drain {
        let env = AppEnv::cli(None);
        let report = EffectsLogic::drain(&mut pool, cfg, &env, now)?;
        if report.skipped {
            messages::info("Another drain is already running, nothing to do.");
        } else {
            messages::success(format!(
                "Drain complete: {} executed, {} retried, {} dead.",
                report.executed, report.retried, report.dead
            ));
        }
    }

    if *print {
        let rows = queue::list_recent(&pool.conn, PRINT_LIMIT)?;
        if rows.is_empty() {
            println!("🧺 Effects queue is empty.");
            return Ok(());
        }
        print_queue(&rows);
    }

    Ok(())
}

fn print_queue(rows: &[QueuedEffect]) {
    println!("🧺 Effects queue (most recent first):\n");
    println!(
        "{}  {}  {}  {}  {}  {}",
        pad_right("ID", 5),
        pad_right("KIND", 20),
        pad_right("STATUS", 8),
        pad_right("PRIO", 8),
        pad_right("TRIES", 5),
        "RUN AFTER"
    );

    for e in rows {
        let status = e.status.to_db_str();
        let color = match status {
            "done" => GREEN,
            "failed" => RED,
            _ if e.attempts > 0 => YELLOW,
            _ => RESET,
        };
        let run_after = match e.run_after {
            Some(t) => format_opt_ts(Some(t)),
            None => format!("{GREY}now{RESET}"),
        };

        println!(
            "{}  {}  {}{}{}  {}  {}  {}",
            pad_right(&e.id.to_string(), 5),
            pad_right(e.kind.to_db_str(), 20),
            color,
            pad_right(status, 8),
            RESET,
            pad_right(e.priority.to_db_str(), 8),
            pad_right(&e.attempts.to_string(), 5),
            run_after
        );

        if let Some(err) = &e.last_error {
            println!("       {GREY}last error: {err}{RESET}");
        }
    }
}
