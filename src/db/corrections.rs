use crate::db::db_utils::{opt_ts, parse_opt_ts, parse_ts, ts};
use crate::errors::AppResult;
use crate::models::correction::AiCorrection;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

pub fn map_row(row: &Row) -> Result<AiCorrection> {
    Ok(AiCorrection {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        user_id: row.get("user_id")?,
        field: row.get("field")?,
        original_value: row.get("original_value")?,
        corrected_value: row.get("corrected_value")?,
        reason: row.get("reason")?,
        reverted: row.get::<_, i64>("reverted")? == 1,
        deleted: row.get::<_, i64>("deleted")? == 1,
        synced: row.get::<_, i64>("synced")? == 1,
        synced_at: parse_opt_ts(row.get("synced_at")?)?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?)?,
    })
}

pub fn insert_correction(conn: &Connection, c: &AiCorrection) -> AppResult<()> {
    conn.execute(
        "INSERT INTO ai_corrections
            (id, session_id, user_id, field, original_value, corrected_value,
             reason, reverted, deleted, synced, synced_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            c.id,
            c.session_id,
            c.user_id,
            c.field,
            c.original_value,
            c.corrected_value,
            c.reason,
            c.reverted as i64,
            c.deleted as i64,
            c.synced as i64,
            opt_ts(c.synced_at),
            ts(c.created_at),
            ts(c.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_correction(conn: &Connection, c: &AiCorrection) -> AppResult<()> {
    conn.execute(
        "UPDATE ai_corrections
         SET field = ?1, original_value = ?2, corrected_value = ?3, reason = ?4,
             reverted = ?5, deleted = ?6, synced = ?7, synced_at = ?8, updated_at = ?9
         WHERE id = ?10",
        params![
            c.field,
            c.original_value,
            c.corrected_value,
            c.reason,
            c.reverted as i64,
            c.deleted as i64,
            c.synced as i64,
            opt_ts(c.synced_at),
            ts(c.updated_at),
            c.id,
        ],
    )?;
    Ok(())
}

pub fn get_correction(conn: &Connection, id: &str) -> AppResult<Option<AiCorrection>> {
    let mut stmt = conn.prepare("SELECT * FROM ai_corrections WHERE id = ?1")?;
    Ok(stmt.query_row([id], map_row).optional()?)
}

/// Corrections for one session, newest first (the order `undo` picks from).
pub fn list_for_session(conn: &Connection, session_id: &str) -> AppResult<Vec<AiCorrection>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM ai_corrections
         WHERE session_id = ?1 AND deleted = 0
         ORDER BY created_at DESC, id DESC",
    )?;

    let rows = stmt.query_map([session_id], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn dirty_corrections(conn: &Connection, user_id: &str) -> AppResult<Vec<AiCorrection>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM ai_corrections
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
        "UPDATE ai_corrections SET synced = 1, synced_at = ?1 WHERE id = ?2",
        params![ts(at), id],
    )?;
    Ok(())
}

/// Retention: synced, reverted corrections older than `days` are dropped
/// locally. Un-reverted rows stay so `undo` keeps working; the server keeps
/// the full history either way.
pub fn purge_reverted_older_than(
    conn: &Connection,
    now: DateTime<Utc>,
    days: i64,
) -> AppResult<usize> {
    let cutoff = now - Duration::days(days);
    let n = conn.execute(
        "DELETE FROM ai_corrections
         WHERE synced = 1 AND reverted = 1 AND created_at < ?1",
        [ts(cutoff)],
    )?;
    Ok(n)
}
