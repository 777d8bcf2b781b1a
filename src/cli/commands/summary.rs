use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::summary::SummaryLogic;
use crate::db::pool::DbPool;
use crate::db::summaries;
use crate::errors::AppResult;
use crate::models::day_summary::DaySummary;
use crate::ui::messages;
use crate::utils::date::{parse_date, today};
use crate::utils::time::{format_opt_ts, resolve_at};

/// Handle `summary`: show one day's aggregate, optionally recomputing it
/// from its sessions first.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Summary { date, rebuild, at } = cmd else {
        return Ok(());
    };

    let day = match date {
        Some(raw) => parse_date(raw)?,
        None => today(),
    };
    let now = resolve_at(at.as_ref())?;
    let mut pool = DbPool::new(&cfg.database)?;

    let summary = if *rebuild {
        let tx = pool.tx()?;
        let s = SummaryLogic::rebuild_day(&tx, &cfg.user_id, day, now)?;
        tx.commit()?;
        messages::info(format!("Summary for {} rebuilt.", day));
        Some(s)
    } else {
        summaries::get_summary(&pool.conn, &cfg.user_id, day)?
    };

    match summary {
        Some(s) => print_summary(&s),
        None => println!("No summary for {}. Run with --rebuild to compute one.", day),
    }

    Ok(())
}

fn print_summary(s: &DaySummary) {
    println!("📊 {}\n", s.date);
    messages::kv("worked", format!("{} min", s.total_min));
    messages::kv("break", format!("{} min", s.break_min));
    messages::kv("sessions", s.session_count);
    messages::kv("first enter", format_opt_ts(s.first_enter));
    messages::kv("last exit", format_opt_ts(s.last_exit));
    if let Some(loc) = &s.primary_location {
        messages::kv("primary fence", loc);
    }
    if !s.source_mix.is_empty() {
        let mix = s
            .source_mix
            .iter()
            .map(|(src, share)| format!("{} {:.0}%", src, share * 100.0))
            .collect::<Vec<_>>()
            .join(", ");
        messages::kv("sources", mix);
    }
    if !s.flags.is_empty() {
        messages::kv("flags", s.flags.join(", "));
    }
}
