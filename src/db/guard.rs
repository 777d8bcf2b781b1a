use crate::db::db_utils::{parse_ts, ts};
use crate::errors::AppResult;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

/// One armed guard: a session being watched for the 10 h warning and the
/// 16 h force close.
#[derive(Debug, Clone)]
pub struct GuardRow {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub warned: bool,
}

fn map_row(row: &Row) -> rusqlite::Result<GuardRow> {
    Ok(GuardRow {
        session_id: row.get("session_id")?,
        started_at: parse_ts(&row.get::<_, String>("started_at")?)?,
        warned: row.get::<_, i64>("warned")? == 1,
    })
}

/// Arm (or re-arm) the guard for a session. Re-arming resets the warning.
pub fn start_guard(
    conn: &Connection,
    session_id: &str,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO session_guard (session_id, started_at, warned, updated_at)
         VALUES (?1, ?2, 0, ?3)",
        params![session_id, ts(started_at), ts(now)],
    )?;
    Ok(())
}

pub fn cancel_guard(conn: &Connection, session_id: &str) -> AppResult<()> {
    conn.execute(
        "DELETE FROM session_guard WHERE session_id = ?1",
        [session_id],
    )?;
    Ok(())
}

pub fn active_guards(conn: &Connection) -> AppResult<Vec<GuardRow>> {
    let mut stmt =
        conn.prepare("SELECT * FROM session_guard ORDER BY started_at ASC")?;

    let rows = stmt.query_map([], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn mark_warned(conn: &Connection, session_id: &str, now: DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "UPDATE session_guard SET warned = 1, updated_at = ?1 WHERE session_id = ?2",
        params![ts(now), session_id],
    )?;
    Ok(())
}
