//! Bidirectional sync cycle.
//!
//! One `run` is: probe the backend, upload everything dirty, download what
//! changed remotely, resolve conflicts by source priority, rebuild the
//! summaries the download touched, then purge old settled rows.
//!
//! The cycle is re-entrant through the effects queue (every mutation
//! enqueues a `sync_now`), so a process-wide flag collapses overlapping
//! runs into one. A probe failure surfaces as [`AppError::Offline`] and the
//! queue retries on the reconnection rung; everything after the probe
//! collects per-row failures into the report instead of aborting, so one
//! bad row never strands the rest of the backlog.

use crate::config::Config;
use crate::core::summary::SummaryLogic;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::{corrections, locations, queue, sessions, summaries, sync_state};
use crate::errors::AppResult;
use crate::models::effect::EffectRequest;
use crate::models::location::GeofenceLocation;
use crate::models::session::WorkSession;
use crate::sync::conflict::{self, Candidate, Winner};
use crate::sync::remote::{HttpRemote, RemoteStore};
use crate::utils::date::parse_date;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Upload order. Sessions go first so the backend can attach summaries and
/// corrections to rows it already has.
pub const SYNC_TABLES: [&str; 4] = [
    "work_sessions",
    "geofence_locations",
    "day_summaries",
    "ai_corrections",
];

pub const CORRECTION_RETENTION_DAYS: i64 = 90;
pub const QUEUE_RETENTION_DAYS: i64 = 30;

static SYNCING: AtomicBool = AtomicBool::new(false);

// Unit tests run on parallel threads but share the SYNCING flag; tests that
// drive a sync cycle serialize on this.
#[cfg(test)]
pub(crate) static SYNC_TESTS: std::sync::Mutex<()> = std::sync::Mutex::new(());

struct SyncToken;

impl Drop for SyncToken {
    fn drop(&mut self) {
        SYNCING.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    /// Sync is turned off or no backend is configured.
    pub disabled: bool,
    /// Another cycle was already in flight.
    pub skipped: bool,
    pub uploaded: usize,
    pub downloaded: usize,
    pub purged: usize,
    pub errors: Vec<String>,
}

pub struct SyncEngine;

impl SyncEngine {
    pub fn run(pool: &mut DbPool, cfg: &Config, now: DateTime<Utc>) -> AppResult<SyncReport> {
        if !cfg.sync_enabled {
            return Ok(SyncReport {
                disabled: true,
                ..SyncReport::default()
            });
        }
        let Some(remote) = HttpRemote::from_config(cfg) else {
            return Ok(SyncReport {
                disabled: true,
                ..SyncReport::default()
            });
        };
        Self::run_with(&remote, pool, cfg, now)
    }

    /// The cycle against an explicit backend (tests inject a memory store).
    pub fn run_with(
        remote: &dyn RemoteStore,
        pool: &mut DbPool,
        cfg: &Config,
        now: DateTime<Utc>,
    ) -> AppResult<SyncReport> {
        if SYNCING.swap(true, Ordering::SeqCst) {
            return Ok(SyncReport {
                skipped: true,
                ..SyncReport::default()
            });
        }
        let _token = SyncToken;

        remote.probe()?;

        let mut report = SyncReport::default();
        Self::upload(remote, pool, cfg, now, &mut report)?;
        Self::download(remote, pool, cfg, now, &mut report)?;
        report.purged = Self::retention(pool, now)?;

        oplog(
            &pool.conn,
            "sync",
            "",
            &format!(
                "cycle: {} up, {} down, {} purged, {} errors",
                report.uploaded,
                report.downloaded,
                report.purged,
                report.errors.len()
            ),
        )?;
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    fn upload(
        remote: &dyn RemoteStore,
        pool: &mut DbPool,
        cfg: &Config,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AppResult<()> {
        Self::upload_sessions(remote, pool, cfg, now, report)?;
        Self::upload_locations(remote, pool, cfg, now, report)?;
        Self::upload_summaries(remote, pool, cfg, now, report)?;
        Self::upload_corrections(remote, pool, cfg, now, report)?;
        Ok(())
    }

    fn upload_sessions(
        remote: &dyn RemoteStore,
        pool: &mut DbPool,
        cfg: &Config,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AppResult<()> {
        let dirty = sessions::dirty_sessions(&pool.conn, &cfg.user_id)?;
        let mut batch = Vec::new();
        let mut sent = Vec::new();
        for s in dirty {
            // Tombstone the backend never saw: just drop it.
            if s.deleted && s.synced_at.is_none() {
                sessions::hard_delete(&pool.conn, &s.id)?;
                continue;
            }
            batch.push(serde_json::to_value(&s)?);
            sent.push((s.id, s.deleted));
        }

        let acked: HashSet<String> = remote
            .upsert("work_sessions", &batch)?
            .into_iter()
            .collect();
        for (id, deleted) in sent {
            if !acked.contains(&id) {
                report.errors.push(format!("work_sessions/{id}: not acknowledged"));
                continue;
            }
            if deleted {
                sessions::hard_delete(&pool.conn, &id)?;
            } else {
                sessions::mark_synced(&pool.conn, &id, now)?;
            }
            report.uploaded += 1;
        }
        sync_state::set_last_upload(&pool.conn, "work_sessions", now)?;
        Ok(())
    }

    fn upload_locations(
        remote: &dyn RemoteStore,
        pool: &mut DbPool,
        cfg: &Config,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AppResult<()> {
        let dirty = locations::dirty_locations(&pool.conn, &cfg.user_id)?;
        let mut batch = Vec::new();
        let mut sent = Vec::new();
        for f in dirty {
            if f.deleted && f.synced_at.is_none() {
                locations::hard_delete(&pool.conn, &f.id)?;
                continue;
            }
            batch.push(serde_json::to_value(&f)?);
            sent.push((f.id, f.deleted));
        }

        let acked: HashSet<String> = remote
            .upsert("geofence_locations", &batch)?
            .into_iter()
            .collect();
        for (id, deleted) in sent {
            if !acked.contains(&id) {
                report
                    .errors
                    .push(format!("geofence_locations/{id}: not acknowledged"));
                continue;
            }
            if deleted {
                locations::hard_delete(&pool.conn, &id)?;
            } else {
                locations::mark_synced(&pool.conn, &id, now)?;
            }
            report.uploaded += 1;
        }
        sync_state::set_last_upload(&pool.conn, "geofence_locations", now)?;
        Ok(())
    }

    /// Summaries are derived data: upload only, no tombstones. A deleted
    /// day disappears because its rebuilt summary replaces it.
    fn upload_summaries(
        remote: &dyn RemoteStore,
        pool: &mut DbPool,
        cfg: &Config,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AppResult<()> {
        let dirty = summaries::dirty_summaries(&pool.conn, &cfg.user_id)?;
        let mut batch = Vec::new();
        let mut sent = Vec::new();
        for s in dirty {
            batch.push(serde_json::to_value(&s)?);
            sent.push(s.id);
        }

        let acked: HashSet<String> =
            remote.upsert("day_summaries", &batch)?.into_iter().collect();
        for id in sent {
            if !acked.contains(&id) {
                report.errors.push(format!("day_summaries/{id}: not acknowledged"));
                continue;
            }
            summaries::mark_synced(&pool.conn, &id, now)?;
            report.uploaded += 1;
        }
        sync_state::set_last_upload(&pool.conn, "day_summaries", now)?;
        Ok(())
    }

    fn upload_corrections(
        remote: &dyn RemoteStore,
        pool: &mut DbPool,
        cfg: &Config,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AppResult<()> {
        let dirty = corrections::dirty_corrections(&pool.conn, &cfg.user_id)?;
        let mut batch = Vec::new();
        let mut sent = Vec::new();
        for c in dirty {
            batch.push(serde_json::to_value(&c)?);
            sent.push(c.id);
        }

        let acked: HashSet<String> =
            remote.upsert("ai_corrections", &batch)?.into_iter().collect();
        for id in sent {
            if !acked.contains(&id) {
                report.errors.push(format!("ai_corrections/{id}: not acknowledged"));
                continue;
            }
            corrections::mark_synced(&pool.conn, &id, now)?;
            report.uploaded += 1;
        }
        sync_state::set_last_upload(&pool.conn, "ai_corrections", now)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------

    fn download(
        remote: &dyn RemoteStore,
        pool: &mut DbPool,
        cfg: &Config,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AppResult<()> {
        // Sessions first so fence mirroring happens on a settled set.
        let since = sync_state::last_download(&pool.conn, "work_sessions")?;
        let rows = remote.changed_since("work_sessions", &cfg.user_id, since)?;
        let mut latest: Option<DateTime<Utc>> = None;
        let mut touched_days = BTreeSet::new();
        for value in rows {
            match serde_json::from_value::<WorkSession>(value) {
                Err(e) => report
                    .errors
                    .push(format!("work_sessions: undecodable row: {e}")),
                Ok(row) => {
                    latest = latest.max(Some(row.updated_at));
                    if let Some(day) =
                        Self::apply_remote_session(&pool.conn, &cfg.user_id, row, now)?
                    {
                        report.downloaded += 1;
                        touched_days.insert(day);
                    }
                }
            }
        }
        if let Some(ts) = latest {
            sync_state::set_last_download(&pool.conn, "work_sessions", ts)?;
        }
        for day in touched_days {
            let date = parse_date(&day)?;
            SummaryLogic::rebuild_day(&pool.conn, &cfg.user_id, date, now)?;
        }

        let since = sync_state::last_download(&pool.conn, "geofence_locations")?;
        let rows = remote.changed_since("geofence_locations", &cfg.user_id, since)?;
        let mut latest: Option<DateTime<Utc>> = None;
        let mut fences_changed = false;
        for value in rows {
            match serde_json::from_value::<GeofenceLocation>(value) {
                Err(e) => report
                    .errors
                    .push(format!("geofence_locations: undecodable row: {e}")),
                Ok(row) => {
                    latest = latest.max(Some(row.updated_at));
                    if Self::apply_remote_location(&pool.conn, &cfg.user_id, row, now)? {
                        report.downloaded += 1;
                        fences_changed = true;
                    }
                }
            }
        }
        if let Some(ts) = latest {
            sync_state::set_last_download(&pool.conn, "geofence_locations", ts)?;
        }
        if fences_changed {
            // Re-mirror the fence set into the OS layer on the next drain.
            queue::enqueue(&pool.conn, &EffectRequest::SyncFences, now)?;
        }
        Ok(())
    }

    /// Returns the touched day key when the remote row was applied.
    fn apply_remote_session(
        conn: &rusqlite::Connection,
        user_id: &str,
        mut row: WorkSession,
        now: DateTime<Utc>,
    ) -> AppResult<Option<String>> {
        if row.user_id != user_id {
            return Ok(None);
        }
        match sessions::get_session(conn, &row.id)? {
            None => {
                if row.deleted {
                    return Ok(None);
                }
                // The cursor is this device's own state; a remote open
                // session never displaces a different local one.
                if row.is_open()
                    && let Some(open) = sessions::find_open_session(conn, user_id)?
                    && open.id != row.id
                {
                    return Ok(None);
                }
                row.synced = true;
                row.synced_at = Some(now);
                let day = row.day_key();
                sessions::insert_session(conn, &row)?;
                Ok(Some(day))
            }
            Some(local) => {
                let ours = Candidate::new(Some(local.source), local.updated_at);
                let theirs = Candidate::new(Some(row.source), row.updated_at);
                if conflict::resolve(&ours, &theirs) == Winner::Local {
                    return Ok(None);
                }
                if row.deleted {
                    let day = local.day_key();
                    sessions::hard_delete(conn, &local.id)?;
                    return Ok(Some(day));
                }
                row.synced = true;
                row.synced_at = Some(now);
                let day = row.day_key();
                sessions::update_session(conn, &row)?;
                Ok(Some(day))
            }
        }
    }

    fn apply_remote_location(
        conn: &rusqlite::Connection,
        user_id: &str,
        mut row: GeofenceLocation,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        if row.user_id != user_id {
            return Ok(false);
        }
        match locations::get_location(conn, &row.id)? {
            None => {
                if row.deleted {
                    return Ok(false);
                }
                row.synced = true;
                row.synced_at = Some(now);
                locations::insert_location(conn, &row)?;
                Ok(true)
            }
            Some(local) => {
                let ours = Candidate::new(None, local.updated_at);
                let theirs = Candidate::new(None, row.updated_at);
                if conflict::resolve(&ours, &theirs) == Winner::Local {
                    return Ok(false);
                }
                if row.deleted {
                    locations::hard_delete(conn, &local.id)?;
                    return Ok(true);
                }
                row.synced = true;
                row.synced_at = Some(now);
                locations::update_location(conn, &row)?;
                Ok(true)
            }
        }
    }

    // ------------------------------------------------------------------
    // Retention
    // ------------------------------------------------------------------

    fn retention(pool: &mut DbPool, now: DateTime<Utc>) -> AppResult<usize> {
        let a = corrections::purge_reverted_older_than(&pool.conn, now, CORRECTION_RETENTION_DAYS)?;
        let b = queue::purge_settled_older_than(&pool.conn, now, QUEUE_RETENTION_DAYS)?;
        Ok(a + b)
    }
}
