use crate::db::db_utils::{bad_value, opt_ts, parse_opt_ts, parse_ts, ts};
use crate::errors::{AppError, AppResult};
use crate::models::session::WorkSession;
use crate::models::source::SessionSource;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

pub fn map_row(row: &Row) -> Result<WorkSession> {
    let source_str: String = row.get("source")?;
    let source = SessionSource::from_db_str(&source_str)
        .ok_or_else(|| bad_value(AppError::InvalidSource(source_str.clone())))?;

    let enter_str: String = row.get("enter_at")?;
    let meta_str: String = row.get("meta")?;
    let meta =
        serde_json::from_str(&meta_str).map_err(|e| bad_value(AppError::Json(e)))?;

    Ok(WorkSession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        location_id: row.get("location_id")?,
        location_name: row.get("location_name")?,
        enter_at: parse_ts(&enter_str)?,
        exit_at: parse_opt_ts(row.get("exit_at")?)?,
        break_secs: row.get("break_secs")?,
        duration_min: row.get("duration_min")?,
        source,
        confidence: row.get("confidence")?,
        notes: row.get("notes")?,
        meta,
        deleted: row.get::<_, i64>("deleted")? == 1,
        synced: row.get::<_, i64>("synced")? == 1,
        synced_at: parse_opt_ts(row.get("synced_at")?)?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?)?,
    })
}

pub fn insert_session(conn: &Connection, s: &WorkSession) -> AppResult<()> {
    conn.execute(
        "INSERT INTO work_sessions
            (id, user_id, location_id, location_name, enter_at, exit_at,
             break_secs, duration_min, source, confidence, notes, meta,
             deleted, synced, synced_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            s.id,
            s.user_id,
            s.location_id,
            s.location_name,
            ts(s.enter_at),
            opt_ts(s.exit_at),
            s.break_secs,
            s.duration_min,
            s.source.to_db_str(),
            s.confidence,
            s.notes,
            s.meta_str(),
            s.deleted as i64,
            s.synced as i64,
            opt_ts(s.synced_at),
            ts(s.created_at),
            ts(s.updated_at),
        ],
    )?;
    Ok(())
}

/// Update a session (all fields except id).
pub fn update_session(conn: &Connection, s: &WorkSession) -> AppResult<()> {
    conn.execute(
        "UPDATE work_sessions
         SET user_id = ?1, location_id = ?2, location_name = ?3,
             enter_at = ?4, exit_at = ?5, break_secs = ?6, duration_min = ?7,
             source = ?8, confidence = ?9, notes = ?10, meta = ?11,
             deleted = ?12, synced = ?13, synced_at = ?14,
             created_at = ?15, updated_at = ?16
         WHERE id = ?17",
        params![
            s.user_id,
            s.location_id,
            s.location_name,
            ts(s.enter_at),
            opt_ts(s.exit_at),
            s.break_secs,
            s.duration_min,
            s.source.to_db_str(),
            s.confidence,
            s.notes,
            s.meta_str(),
            s.deleted as i64,
            s.synced as i64,
            opt_ts(s.synced_at),
            ts(s.created_at),
            ts(s.updated_at),
            s.id,
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, id: &str) -> AppResult<Option<WorkSession>> {
    let mut stmt = conn.prepare("SELECT * FROM work_sessions WHERE id = ?1")?;
    Ok(stmt.query_row([id], map_row).optional()?)
}

/// The open session for a user, if any. The partial unique index guarantees
/// at most one exists.
pub fn find_open_session(conn: &Connection, user_id: &str) -> AppResult<Option<WorkSession>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM work_sessions
         WHERE user_id = ?1 AND exit_at IS NULL AND deleted = 0",
    )?;
    Ok(stmt.query_row([user_id], map_row).optional()?)
}

fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = day.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    let end = day
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc());
    (
        start.map(ts).unwrap_or_default(),
        end.map(ts).unwrap_or_else(|| "9999-12-31T23:59:59Z".to_string()),
    )
}

/// Non-deleted sessions whose enter falls on the given UTC day, ordered by
/// (enter_at, id) so summary rebuilds are deterministic.
pub fn load_sessions_for_day(
    conn: &Connection,
    user_id: &str,
    day: NaiveDate,
) -> AppResult<Vec<WorkSession>> {
    let (lo, hi) = day_bounds(day);
    let mut stmt = conn.prepare(
        "SELECT * FROM work_sessions
         WHERE user_id = ?1 AND deleted = 0 AND enter_at >= ?2 AND enter_at < ?3
         ORDER BY enter_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![user_id, lo, hi], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Non-deleted sessions entering between two UTC days, inclusive.
pub fn load_sessions_between(
    conn: &Connection,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<WorkSession>> {
    let (lo, _) = day_bounds(start);
    let (_, hi) = day_bounds(end);
    let mut stmt = conn.prepare(
        "SELECT * FROM work_sessions
         WHERE user_id = ?1 AND deleted = 0 AND enter_at >= ?2 AND enter_at < ?3
         ORDER BY enter_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![user_id, lo, hi], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Tombstoned sessions entering between two UTC days, for `list --deleted`.
pub fn load_deleted_between(
    conn: &Connection,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<WorkSession>> {
    let (lo, _) = day_bounds(start);
    let (_, hi) = day_bounds(end);
    let mut stmt = conn.prepare(
        "SELECT * FROM work_sessions
         WHERE user_id = ?1 AND deleted = 1 AND enter_at >= ?2 AND enter_at < ?3
         ORDER BY enter_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![user_id, lo, hi], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Sessions with local changes the server has not seen, tombstones included.
pub fn dirty_sessions(conn: &Connection, user_id: &str) -> AppResult<Vec<WorkSession>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM work_sessions
         WHERE user_id = ?1 AND synced = 0
         ORDER BY updated_at ASC, id ASC",
    )?;

    let rows = stmt.query_map([user_id], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn mark_synced(conn: &Connection, id: &str, at: DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "UPDATE work_sessions SET synced = 1, synced_at = ?1 WHERE id = ?2",
        params![ts(at), id],
    )?;
    Ok(())
}

/// Physically remove an acknowledged tombstone.
pub fn hard_delete(conn: &Connection, id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM work_sessions WHERE id = ?1", [id])?;
    Ok(())
}

pub fn count_sessions(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM work_sessions WHERE deleted = 0",
        [],
        |row| row.get(0),
    )
}
