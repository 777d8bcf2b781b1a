use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::pool::DbPool;
use crate::db::sessions;
use crate::errors::AppResult;
use crate::models::session::WorkSession;
use crate::utils::colors::{GREY, RESET, color_for_optional_field};
use crate::utils::date;
use crate::utils::formatting::pad_right;
use crate::utils::{describe_source, mins2readable};
use chrono::NaiveDate;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::List {
        period,
        today,
        deleted,
    } = cmd
    {
        let pool = DbPool::new(&cfg.database)?;

        let (start, end) = resolve_period(period, *today)?;

        let rows = if *deleted {
            sessions::load_deleted_between(&pool.conn, &cfg.user_id, start, end)?
        } else {
            sessions::load_sessions_between(&pool.conn, &cfg.user_id, start, end)?
        };

        if rows.is_empty() {
            if *deleted {
                println!("No deleted sessions between {} and {}.", start, end);
            } else {
                println!("No sessions between {} and {}.", start, end);
            }
            return Ok(());
        }

        print_table(&rows, *deleted);
    }
    Ok(())
}

fn resolve_period(period: &Option<String>, today: bool) -> AppResult<(NaiveDate, NaiveDate)> {
    if today {
        let t = date::today();
        return Ok((t, t));
    }

    if let Some(p) = period {
        // START:END, dove ogni lato è a sua volta un periodo
        if let Some((a, b)) = p.split_once(':') {
            return date::range_bounds(a, b);
        }
        return date::period_bounds(p);
    }

    Ok(date::current_month_bounds())
}

fn print_table(rows: &[WorkSession], deleted: bool) {
    let title = if deleted {
        "🗑️  Deleted sessions:"
    } else {
        "🗒️  Sessions:"
    };
    println!("{}\n", title);

    // Larghezza della colonna fence calcolata sui dati
    let fence_w = rows
        .iter()
        .map(|s| s.location_name.as_deref().unwrap_or("--").len())
        .max()
        .unwrap_or(2)
        .max(5);

    println!(
        "{}  {}  {}  {}   {}   {}  {}  {}",
        pad_right("ID", 8),
        pad_right("DATE", 10),
        pad_right("FENCE", fence_w),
        "IN",
        "OUT",
        "BREAK",
        "TOTAL ",
        "SOURCE"
    );

    let mut total_min: i64 = 0;
    let mut open_count = 0usize;

    for s in rows {
        let short_id: String = s.id.chars().take(8).collect();
        let fence = s.location_name.as_deref().unwrap_or("--");
        let enter = s.enter_at.format("%H:%M").to_string();
        let exit = match s.exit_at {
            Some(t) => t.format("%H:%M").to_string(),
            None => "--:--".to_string(),
        };
        let break_str = mins2readable(s.break_secs / 60, false, true);
        let total = match s.duration_min {
            Some(m) => {
                total_min += m;
                mins2readable(m, false, true)
            }
            None => {
                open_count += 1;
                " open".to_string()
            }
        };
        let (src_label, src_color) = describe_source(s.source.to_db_str());

        println!(
            "{}  {}  {}  {}  {}{}{}  {}  {}  {}{}{}",
            pad_right(&short_id, 8),
            s.day_key(),
            pad_right(fence, fence_w),
            enter,
            color_for_optional_field(Some(exit.as_str())),
            exit,
            RESET,
            break_str,
            total,
            src_color,
            src_label,
            RESET
        );
    }

    println!();
    println!(
        "Worked: {} across {} session(s){}",
        mins2readable(total_min, false, false),
        rows.len(),
        if open_count > 0 {
            format!(", {GREY}{open_count} still open{RESET}")
        } else {
            String::new()
        }
    );
}
