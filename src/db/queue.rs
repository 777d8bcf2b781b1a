use crate::db::db_utils::{bad_value, opt_ts, parse_opt_ts, parse_ts, ts};
use crate::errors::{AppError, AppResult};
use crate::models::effect::{EffectKind, EffectPriority, EffectRequest, EffectStatus, QueuedEffect};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Result, Row, params};

pub fn map_row(row: &Row) -> Result<QueuedEffect> {
    let kind_str: String = row.get("kind")?;
    let kind = EffectKind::from_db_str(&kind_str)
        .ok_or_else(|| bad_value(AppError::InvalidEffect(kind_str.clone())))?;

    let status_str: String = row.get("status")?;
    let status = EffectStatus::from_db_str(&status_str)
        .ok_or_else(|| bad_value(AppError::InvalidEffect(status_str.clone())))?;

    let prio_str: String = row.get("priority")?;
    let priority = EffectPriority::from_db_str(&prio_str)
        .ok_or_else(|| bad_value(AppError::InvalidEffect(prio_str.clone())))?;

    let payload_str: String = row.get("payload")?;
    let payload =
        serde_json::from_str(&payload_str).map_err(|e| bad_value(AppError::Json(e)))?;

    Ok(QueuedEffect {
        id: row.get("id")?,
        kind,
        payload,
        status,
        attempts: row.get("attempts")?,
        priority,
        run_after: parse_opt_ts(row.get("run_after")?)?,
        last_error: row.get("last_error")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?)?,
    })
}

/// Enqueue an effect. Duplicates of a pending effect are allowed: handlers
/// are idempotent, so a redundant rebuild or sync is harmless while a
/// deduplicated-away one could be lost. Returns the row id.
pub fn enqueue(conn: &Connection, req: &EffectRequest, now: DateTime<Utc>) -> AppResult<i64> {
    enqueue_after(conn, req, now, None)
}

/// Enqueue with an explicit not-before time (settle probes).
pub fn enqueue_after(
    conn: &Connection,
    req: &EffectRequest,
    now: DateTime<Utc>,
    run_after: Option<DateTime<Utc>>,
) -> AppResult<i64> {
    let kind = req.kind();
    let payload = req.payload().to_string();

    conn.execute(
        "INSERT INTO effects_queue
            (kind, payload, status, attempts, priority, run_after, created_at, updated_at)
         VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, ?5)",
        params![
            kind.to_db_str(),
            payload,
            kind.priority().to_db_str(),
            opt_ts(run_after),
            ts(now),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Pending effects whose not-before time has passed, oldest first.
pub fn due_effects(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> AppResult<Vec<QueuedEffect>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM effects_queue
         WHERE status = 'pending' AND (run_after IS NULL OR run_after <= ?1)
         ORDER BY id ASC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![ts(now), limit as i64], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn mark_done(conn: &Connection, id: i64, now: DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "UPDATE effects_queue
         SET status = 'done', last_error = NULL, updated_at = ?1
         WHERE id = ?2",
        params![ts(now), id],
    )?;
    Ok(())
}

/// Record a failed attempt and schedule the retry.
pub fn record_retry(
    conn: &Connection,
    id: i64,
    attempts: i64,
    run_after: DateTime<Utc>,
    err: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    conn.execute(
        "UPDATE effects_queue
         SET attempts = ?1, run_after = ?2, last_error = ?3, updated_at = ?4
         WHERE id = ?5",
        params![attempts, ts(run_after), err, ts(now), id],
    )?;
    Ok(())
}

/// Dead-letter a normal effect that exhausted its attempts.
pub fn mark_dead(
    conn: &Connection,
    id: i64,
    attempts: i64,
    err: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    conn.execute(
        "UPDATE effects_queue
         SET status = 'failed', attempts = ?1, last_error = ?2, updated_at = ?3
         WHERE id = ?4",
        params![attempts, err, ts(now), id],
    )?;
    Ok(())
}

pub fn pending_count(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM effects_queue WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )
}

/// Recent queue rows for inspection, newest first.
pub fn list_recent(conn: &Connection, limit: usize) -> AppResult<Vec<QueuedEffect>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM effects_queue ORDER BY id DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map([limit as i64], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Retention: settled rows (done or dead-lettered) older than `days` go away.
pub fn purge_settled_older_than(
    conn: &Connection,
    now: DateTime<Utc>,
    days: i64,
) -> AppResult<usize> {
    let cutoff = now - Duration::days(days);
    let n = conn.execute(
        "DELETE FROM effects_queue
         WHERE status IN ('done', 'failed') AND updated_at < ?1",
        [ts(cutoff)],
    )?;
    Ok(n)
}
