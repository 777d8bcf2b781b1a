use crate::db::pool::DbPool;
use crate::db::{locations, queue, sessions, summaries};
use crate::utils::colors::{CYAN, GREEN, GREY, RESET, YELLOW};
use rusqlite::OptionalExtension;
use std::fs;

pub fn print_db_info(pool: &mut DbPool, db_path: &str) -> rusqlite::Result<()> {
    println!();

    //
    // 1) FILE SIZE
    //
    let file_size = fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);
    let file_mb = (file_size as f64) / (1024.0 * 1024.0);

    println!("{}• File:{} {}{}{}", CYAN, RESET, YELLOW, db_path, RESET);
    println!("{}• Size:{} {:.2} MB", CYAN, RESET, file_mb);

    //
    // 2) ROW COUNTS
    //
    let n_sessions = sessions::count_sessions(&pool.conn)?;
    let n_fences = locations::count_locations(&pool.conn)?;
    let n_summaries = summaries::count_summaries(&pool.conn)?;
    let n_pending = queue::pending_count(&pool.conn)?;
    let n_corrections: i64 = pool.conn.query_row(
        "SELECT COUNT(*) FROM ai_corrections WHERE deleted = 0",
        [],
        |row| row.get(0),
    )?;

    println!(
        "{}• Sessions:{} {}{}{}",
        CYAN, RESET, GREEN, n_sessions, RESET
    );
    println!("{}• Fences:{} {}{}{}", CYAN, RESET, GREEN, n_fences, RESET);
    println!(
        "{}• Day summaries:{} {}{}{}",
        CYAN, RESET, GREEN, n_summaries, RESET
    );
    println!(
        "{}• AI corrections:{} {}{}{}",
        CYAN, RESET, GREEN, n_corrections, RESET
    );
    println!(
        "{}• Pending effects:{} {}{}{}",
        CYAN, RESET, YELLOW, n_pending, RESET
    );

    //
    // 3) SESSION DATE RANGE
    //
    let first: Option<String> = pool
        .conn
        .query_row(
            "SELECT enter_at FROM work_sessions WHERE deleted = 0
             ORDER BY enter_at ASC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let last: Option<String> = pool
        .conn
        .query_row(
            "SELECT enter_at FROM work_sessions WHERE deleted = 0
             ORDER BY enter_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let fmt_first = first.unwrap_or_else(|| format!("{GREY}--{RESET}"));
    let fmt_last = last.unwrap_or_else(|| format!("{GREY}--{RESET}"));

    println!("{}• Session range:{}", CYAN, RESET);
    println!("    from: {}", fmt_first);
    println!("    to:   {}", fmt_last);

    //
    // 4) TRACKING CURSOR
    //
    let status: Option<String> = pool
        .conn
        .query_row(
            "SELECT status FROM active_tracking WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    println!(
        "{}• Tracking status:{} {}",
        CYAN,
        RESET,
        status.unwrap_or_else(|| "IDLE".to_string())
    );

    println!();
    Ok(())
}
