use crate::db::db_utils::{bad_value, opt_ts, parse_opt_ts, parse_ts, ts};
use crate::errors::{AppError, AppResult};
use crate::models::day_summary::DaySummary;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

pub fn map_row(row: &Row) -> Result<DaySummary> {
    let date_str: String = row.get("date")?;
    NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|_| bad_value(AppError::InvalidDate(date_str.clone())))?;

    let mix_str: String = row.get("source_mix")?;
    let source_mix =
        serde_json::from_str(&mix_str).map_err(|e| bad_value(AppError::Json(e)))?;

    let flags_str: String = row.get("flags")?;
    let flags = serde_json::from_str(&flags_str).map_err(|e| bad_value(AppError::Json(e)))?;

    Ok(DaySummary {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        date: date_str,
        total_min: row.get("total_min")?,
        break_min: row.get("break_min")?,
        first_enter: parse_opt_ts(row.get("first_enter")?)?,
        last_exit: parse_opt_ts(row.get("last_exit")?)?,
        session_count: row.get("session_count")?,
        primary_location: row.get("primary_location")?,
        source_mix,
        flags,
        deleted: row.get::<_, i64>("deleted")? == 1,
        synced: row.get::<_, i64>("synced")? == 1,
        synced_at: parse_opt_ts(row.get("synced_at")?)?,
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?)?,
    })
}

/// Insert or replace the summary for (user, day). On conflict the existing
/// row id is kept so the server sees an update, not a new record.
pub fn upsert_summary(conn: &Connection, s: &DaySummary) -> AppResult<()> {
    conn.execute(
        "INSERT INTO day_summaries
            (id, user_id, date, total_min, break_min, first_enter, last_exit,
             session_count, primary_location, source_mix, flags,
             deleted, synced, synced_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(user_id, date) DO UPDATE SET
             total_min = excluded.total_min,
             break_min = excluded.break_min,
             first_enter = excluded.first_enter,
             last_exit = excluded.last_exit,
             session_count = excluded.session_count,
             primary_location = excluded.primary_location,
             source_mix = excluded.source_mix,
             flags = excluded.flags,
             deleted = excluded.deleted,
             synced = excluded.synced,
             synced_at = excluded.synced_at,
             updated_at = excluded.updated_at",
        params![
            s.id,
            s.user_id,
            s.date,
            s.total_min,
            s.break_min,
            opt_ts(s.first_enter),
            opt_ts(s.last_exit),
            s.session_count,
            s.primary_location,
            s.source_mix_json(),
            s.flags_json(),
            s.deleted as i64,
            s.synced as i64,
            opt_ts(s.synced_at),
            ts(s.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_summary(
    conn: &Connection,
    user_id: &str,
    date: NaiveDate,
) -> AppResult<Option<DaySummary>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM day_summaries WHERE user_id = ?1 AND date = ?2",
    )?;
    Ok(stmt
        .query_row(
            params![user_id, date.format("%Y-%m-%d").to_string()],
            map_row,
        )
        .optional()?)
}

pub fn list_between(
    conn: &Connection,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<DaySummary>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM day_summaries
         WHERE user_id = ?1 AND deleted = 0 AND date >= ?2 AND date <= ?3
         ORDER BY date ASC",
    )?;

    let rows = stmt.query_map(
        params![
            user_id,
            start.format("%Y-%m-%d").to_string(),
            end.format("%Y-%m-%d").to_string()
        ],
        map_row,
    )?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn dirty_summaries(conn: &Connection, user_id: &str) -> AppResult<Vec<DaySummary>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM day_summaries
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
        "UPDATE day_summaries SET synced = 1, synced_at = ?1 WHERE id = ?2",
        params![ts(at), id],
    )?;
    Ok(())
}

pub fn count_summaries(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM day_summaries WHERE deleted = 0",
        [],
        |row| row.get(0),
    )
}
