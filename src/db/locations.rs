use crate::db::db_utils::{opt_ts, parse_opt_ts, parse_ts, ts};
use crate::errors::AppResult;
use crate::models::location::GeofenceLocation;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

pub fn map_row(row: &Row) -> Result<GeofenceLocation> {
    Ok(GeofenceLocation {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        lat: row.get("lat")?,
        lng: row.get("lng")?,
        radius_m: row.get("radius_m")?,
        deleted: row.get::<_, i64>("deleted")? == 1,
        synced: row.get::<_, i64>("synced")? == 1,
        synced_at: parse_opt_ts(row.get("synced_at")?)?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?)?,
    })
}

pub fn insert_location(conn: &Connection, loc: &GeofenceLocation) -> AppResult<()> {
    conn.execute(
        "INSERT INTO geofence_locations
            (id, user_id, name, lat, lng, radius_m,
             deleted, synced, synced_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            loc.id,
            loc.user_id,
            loc.name,
            loc.lat,
            loc.lng,
            loc.radius_m,
            loc.deleted as i64,
            loc.synced as i64,
            opt_ts(loc.synced_at),
            ts(loc.created_at),
            ts(loc.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_location(conn: &Connection, loc: &GeofenceLocation) -> AppResult<()> {
    conn.execute(
        "UPDATE geofence_locations
         SET user_id = ?1, name = ?2, lat = ?3, lng = ?4, radius_m = ?5,
             deleted = ?6, synced = ?7, synced_at = ?8,
             created_at = ?9, updated_at = ?10
         WHERE id = ?11",
        params![
            loc.user_id,
            loc.name,
            loc.lat,
            loc.lng,
            loc.radius_m,
            loc.deleted as i64,
            loc.synced as i64,
            opt_ts(loc.synced_at),
            ts(loc.created_at),
            ts(loc.updated_at),
            loc.id,
        ],
    )?;
    Ok(())
}

pub fn get_location(conn: &Connection, id: &str) -> AppResult<Option<GeofenceLocation>> {
    let mut stmt = conn.prepare("SELECT * FROM geofence_locations WHERE id = ?1")?;
    Ok(stmt.query_row([id], map_row).optional()?)
}

/// Look a fence up by exact name (non-deleted only). Names are how users
/// refer to fences on the command line.
pub fn find_by_name(
    conn: &Connection,
    user_id: &str,
    name: &str,
) -> AppResult<Option<GeofenceLocation>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM geofence_locations
         WHERE user_id = ?1 AND name = ?2 AND deleted = 0",
    )?;
    Ok(stmt.query_row(params![user_id, name], map_row).optional()?)
}

pub fn list_active(conn: &Connection, user_id: &str) -> AppResult<Vec<GeofenceLocation>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM geofence_locations
         WHERE user_id = ?1 AND deleted = 0
         ORDER BY name ASC",
    )?;

    let rows = stmt.query_map([user_id], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn dirty_locations(conn: &Connection, user_id: &str) -> AppResult<Vec<GeofenceLocation>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM geofence_locations
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
        "UPDATE geofence_locations SET synced = 1, synced_at = ?1 WHERE id = ?2",
        params![ts(at), id],
    )?;
    Ok(())
}

pub fn hard_delete(conn: &Connection, id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM geofence_locations WHERE id = ?1", [id])?;
    Ok(())
}

pub fn count_locations(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM geofence_locations WHERE deleted = 0",
        [],
        |row| row.get(0),
    )
}
