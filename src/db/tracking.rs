use crate::db::db_utils::{bad_value, opt_ts, parse_opt_ts, parse_ts, ts};
use crate::errors::{AppError, AppResult};
use crate::models::tracking::{ActiveTracking, TrackingStatus};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

fn map_row(row: &Row) -> Result<ActiveTracking> {
    let status_str: String = row.get("status")?;
    let status = TrackingStatus::from_db_str(&status_str)
        .ok_or_else(|| bad_value(AppError::InvalidStatus(status_str.clone())))?;

    Ok(ActiveTracking {
        status,
        session_id: row.get("session_id")?,
        fence_id: row.get("fence_id")?,
        fence_name: row.get("fence_name")?,
        entered_at: parse_opt_ts(row.get("entered_at")?)?,
        pending_exit_at: parse_opt_ts(row.get("pending_exit_at")?)?,
        cooldown_until: parse_opt_ts(row.get("cooldown_until")?)?,
        pause_secs: row.get("pause_secs")?,
        outside_count: row.get("outside_count")?,
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?)?,
    })
}

/// Load the singleton cursor. The row is seeded by the baseline migration;
/// a missing row (hand-edited DB) degrades to a fresh IDLE cursor.
pub fn load_cursor(conn: &Connection) -> AppResult<ActiveTracking> {
    let mut stmt = conn.prepare("SELECT * FROM active_tracking WHERE id = 1")?;
    match stmt.query_row([], map_row).optional()? {
        Some(c) => Ok(c),
        None => Ok(ActiveTracking::idle(Utc::now())),
    }
}

/// Persist the singleton cursor. `INSERT OR REPLACE` keeps the CHECK(id = 1)
/// constraint doing its job.
pub fn save_cursor(conn: &Connection, cursor: &ActiveTracking) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO active_tracking
            (id, status, session_id, fence_id, fence_name, entered_at,
             pending_exit_at, cooldown_until, pause_secs, outside_count, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            cursor.status.to_db_str(),
            cursor.session_id,
            cursor.fence_id,
            cursor.fence_name,
            opt_ts(cursor.entered_at),
            opt_ts(cursor.pending_exit_at),
            opt_ts(cursor.cooldown_until),
            cursor.pause_secs,
            cursor.outside_count,
            ts(cursor.updated_at),
        ],
    )?;
    Ok(())
}
