use crate::db::db_utils::{parse_opt_ts, ts};
use crate::errors::AppResult;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

/// Download watermark: the `updated_at` of the newest remote change already
/// applied for a table. The next download asks for strictly newer rows.
pub fn last_download(conn: &Connection, table: &str) -> AppResult<Option<DateTime<Utc>>> {
    let s: Option<Option<String>> = conn
        .query_row(
            "SELECT last_download_at FROM sync_state WHERE table_name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(parse_opt_ts(s.flatten())?)
}

pub fn set_last_download(conn: &Connection, table: &str, at: DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "INSERT INTO sync_state (table_name, last_download_at, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(table_name) DO UPDATE SET
             last_download_at = excluded.last_download_at,
             updated_at = excluded.updated_at",
        params![table, ts(at), ts(at)],
    )?;
    Ok(())
}

/// Drop every watermark. The next download pulls the full backend state
/// again, which is safe because applying a row twice is a no-op.
pub fn reset(conn: &Connection) -> AppResult<()> {
    conn.execute("DELETE FROM sync_state", [])?;
    Ok(())
}

pub fn set_last_upload(conn: &Connection, table: &str, at: DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "INSERT INTO sync_state (table_name, last_upload_at, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(table_name) DO UPDATE SET
             last_upload_at = excluded.last_upload_at,
             updated_at = excluded.updated_at",
        params![table, ts(at), ts(at)],
    )?;
    Ok(())
}
