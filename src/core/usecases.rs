//! Manual, voice and AI operations on sessions and fences.
//!
//! Everything that is not a raw geofence signal funnels through here, and
//! every mutation goes out through the same doors: a validated edit path
//! that enforces the source ranking, and queue effects for the follow-up
//! work (summary rebuild, sync, UI). That uniformity is what makes undo
//! and conflict resolution behave the same for a human and for the AI.

use crate::config::Config;
use crate::core::engine::{Decision, EngineLogic};
use crate::core::recovery::SETTLE_DELAY_SECS;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::{corrections, guard, locations, queue, sessions, tracking};
use crate::errors::{AppError, AppResult};
use crate::models::correction::AiCorrection;
use crate::models::effect::{EffectRequest, SummaryScope};
use crate::models::event::{FenceAction, GeofenceEvent};
use crate::models::location::{GeofenceLocation, MIN_FENCE_RADIUS_M};
use crate::models::session::WorkSession;
use crate::models::source::SessionSource;
use crate::models::tracking::{ActiveTracking, TrackingStatus};
use crate::utils::time::parse_at;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rusqlite::Connection;

/// Partial update to one session. Only the set fields change.
#[derive(Debug, Default, Clone)]
pub struct SessionEdit {
    pub enter_at: Option<DateTime<Utc>>,
    pub exit_at: Option<DateTime<Utc>>,
    pub break_min: Option<i64>,
    pub notes: Option<String>,
}

impl SessionEdit {
    pub fn is_empty(&self) -> bool {
        self.enter_at.is_none()
            && self.exit_at.is_none()
            && self.break_min.is_none()
            && self.notes.is_none()
    }
}

/// Fields the edit path (and therefore corrections) can touch.
pub const EDITABLE_FIELDS: [&str; 4] = ["enter_at", "exit_at", "break_min", "notes"];

/// Build a single-field edit from its wire representation. Used when
/// applying AI suggestions and when undoing a correction.
pub fn edit_for_field(field: &str, value: Option<&str>) -> AppResult<SessionEdit> {
    let mut edit = SessionEdit::default();
    match field {
        "enter_at" => edit.enter_at = Some(required_ts(field, value)?),
        "exit_at" => edit.exit_at = Some(required_ts(field, value)?),
        "break_min" => {
            let raw = value.ok_or_else(|| AppError::InvalidField(field.to_string()))?;
            edit.break_min = Some(
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| AppError::InvalidField(format!("{field}={raw}")))?,
            );
        }
        "notes" => edit.notes = Some(value.unwrap_or_default().to_string()),
        other => {
            return Err(AppError::InvalidField(format!(
                "{other} (editable: {})",
                EDITABLE_FIELDS.join(", ")
            )));
        }
    }
    Ok(edit)
}

/// Current value of an editable field, as the string a correction stores.
pub fn field_value(session: &WorkSession, field: &str) -> AppResult<Option<String>> {
    match field {
        "enter_at" => Ok(Some(crate::db::db_utils::ts(session.enter_at))),
        "exit_at" => Ok(session.exit_at.map(crate::db::db_utils::ts)),
        "break_min" => Ok(Some((session.break_secs / 60).to_string())),
        "notes" => Ok(Some(session.notes.clone())),
        other => Err(AppError::InvalidField(other.to_string())),
    }
}

fn required_ts(field: &str, value: Option<&str>) -> AppResult<DateTime<Utc>> {
    let raw = value.ok_or_else(|| AppError::InvalidField(field.to_string()))?;
    parse_at(raw)
}

/// Resolve a fence by id first, then by name.
pub fn resolve_fence(conn: &Connection, user_id: &str, key: &str) -> AppResult<GeofenceLocation> {
    if let Some(f) = locations::get_location(conn, key)?
        && !f.deleted
        && f.user_id == user_id
    {
        return Ok(f);
    }
    locations::find_by_name(conn, user_id, key)?
        .ok_or_else(|| AppError::FenceNotFound(key.to_string()))
}

pub struct UseCaseLogic;

impl UseCaseLogic {
    /// The single validated edit path. A lower-ranked source cannot touch a
    /// row a higher-ranked one produced; human edits pin confidence to 1.
    pub fn edit_session(
        pool: &mut DbPool,
        session_id: &str,
        edit: &SessionEdit,
        editor: SessionSource,
        now: DateTime<Utc>,
    ) -> AppResult<WorkSession> {
        if edit.is_empty() {
            return Err(AppError::InvalidField("nothing to change".to_string()));
        }

        let tx = pool.tx()?;
        let mut session = sessions::get_session(&tx, session_id)?
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        if editor.priority() < session.source.priority() {
            return Err(AppError::Outranked(
                editor.to_db_str().to_string(),
                session.source.to_db_str().to_string(),
            ));
        }

        let old_day = session.day_key();

        if let Some(enter) = edit.enter_at {
            session.enter_at = enter;
        }
        if let Some(exit) = edit.exit_at {
            session.exit_at = Some(exit);
        }
        if let Some(break_min) = edit.break_min {
            if break_min < 0 {
                return Err(AppError::InvalidField(
                    "break minutes cannot be negative".to_string(),
                ));
            }
            session.break_secs = break_min * 60;
        }
        if let Some(notes) = &edit.notes {
            session.notes = notes.clone();
        }

        if let Some(exit) = session.exit_at {
            if exit <= session.enter_at {
                return Err(AppError::InvalidField(
                    "exit must come after enter".to_string(),
                ));
            }
            session.duration_min = Some(session.net_minutes(exit));
        }

        session.source = editor;
        if editor.is_human() {
            session.confidence = 1.0;
        }
        session.synced = false;
        session.updated_at = now;
        sessions::update_session(&tx, &session)?;

        // Moving enter_at can shift the session into another day; both
        // summaries go stale.
        let new_day = session.day_key();
        Self::enqueue_day_refresh(&tx, &session.user_id, &old_day, now)?;
        if new_day != old_day {
            Self::enqueue_day_refresh(&tx, &session.user_id, &new_day, now)?;
        }
        queue::enqueue(&tx, &EffectRequest::SyncNow, now)?;
        queue::enqueue(&tx, &EffectRequest::UiRefresh, now)?;

        oplog(
            &tx,
            "edit",
            &session.id,
            &format!("edited by {}", editor.to_db_str()),
        )?;
        tx.commit()?;
        Ok(session)
    }

    /// Soft delete. The row survives locally until the remote acknowledges
    /// the tombstone.
    pub fn delete_session(pool: &mut DbPool, session_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        let tx = pool.tx()?;
        let mut session = sessions::get_session(&tx, session_id)?
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        let was_open = session.is_open();
        session.deleted = true;
        session.synced = false;
        session.updated_at = now;
        sessions::update_session(&tx, &session)?;

        if was_open {
            EngineLogic::release_cursor_if_current(&tx, &session.id, now)?;
            guard::cancel_guard(&tx, &session.id)?;
            queue::enqueue(
                &tx,
                &EffectRequest::SwitchMode(crate::models::tracking::TrackingMode::Idle),
                now,
            )?;
        }

        Self::enqueue_day_refresh(&tx, &session.user_id, &session.day_key(), now)?;
        queue::enqueue(&tx, &EffectRequest::SyncNow, now)?;
        queue::enqueue(&tx, &EffectRequest::UiRefresh, now)?;

        oplog(&tx, "del", &session.id, "session soft-deleted")?;
        tx.commit()?;
        Ok(())
    }

    /// Start a session by explicit statement. With a fence the event goes
    /// through the engine (so a running session switches correctly); with
    /// no fence the session is opened directly under cursor discipline.
    pub fn start_manual(
        pool: &mut DbPool,
        cfg: &Config,
        fence_key: Option<&str>,
        source: SessionSource,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<WorkSession> {
        if let Some(key) = fence_key {
            let fence = resolve_fence(&pool.conn, &cfg.user_id, key)?;
            let ev = GeofenceEvent {
                action: FenceAction::Enter,
                fence_id: fence.id.clone(),
                occurred_at: at,
                received_at: now,
                source,
                confidence: 1.0,
                fix: None,
            };
            let out = EngineLogic::handle_event(pool, cfg, &ev, now)?;
            let sid = out
                .session_id
                .ok_or_else(|| AppError::Other("engine returned no session".to_string()))?;
            if out.decision == Decision::DuplicateEnter {
                return Err(AppError::AlreadyTracking);
            }
            return sessions::get_session(&pool.conn, &sid)?
                .ok_or(AppError::SessionNotFound(sid));
        }

        let tx = pool.tx()?;
        EngineLogic::check_cooldown(&tx, now)?;
        if sessions::find_open_session(&tx, &cfg.user_id)?.is_some() {
            return Err(AppError::AlreadyTracking);
        }

        let session = WorkSession::open(&cfg.user_id, None, None, at, source, 1.0, now);
        sessions::insert_session(&tx, &session)?;

        let cursor = ActiveTracking {
            status: TrackingStatus::Tracking,
            session_id: Some(session.id.clone()),
            fence_id: None,
            fence_name: None,
            entered_at: Some(at),
            pending_exit_at: None,
            cooldown_until: None,
            pause_secs: 0,
            outside_count: 0,
            updated_at: now,
        };
        tracking::save_cursor(&tx, &cursor)?;
        EngineLogic::enqueue_enter_effects(&tx, &session, now)?;

        oplog(
            &tx,
            "enter",
            &session.id,
            &format!("started by {} (no fence)", source.to_db_str()),
        )?;
        tx.commit()?;
        Ok(session)
    }

    /// Close the open session at the stated time. An explicit stop does not
    /// wait out any pending cooldown.
    pub fn stop(
        pool: &mut DbPool,
        cfg: &Config,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<WorkSession> {
        let tx = pool.tx()?;
        let open = sessions::find_open_session(&tx, &cfg.user_id)?.ok_or(AppError::NotTracking)?;
        EngineLogic::confirm_exit(&tx, &open.id, at, Some(1.0), "manual stop", now)?;
        let closed = sessions::get_session(&tx, &open.id)?
            .ok_or_else(|| AppError::SessionNotFound(open.id.clone()))?;
        tx.commit()?;
        Ok(closed)
    }

    /// Stamp the pause start on the open session.
    pub fn pause(
        pool: &mut DbPool,
        cfg: &Config,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<WorkSession> {
        let tx = pool.tx()?;
        let mut session =
            sessions::find_open_session(&tx, &cfg.user_id)?.ok_or(AppError::NotTracking)?;
        if session.pause_started_at().is_some() {
            return Err(AppError::Other("session is already paused".to_string()));
        }
        session.set_pause_started_at(Some(at));
        session.synced = false;
        session.updated_at = now;
        sessions::update_session(&tx, &session)?;
        oplog(&tx, "pause", &session.id, "pause started")?;
        tx.commit()?;
        Ok(session)
    }

    /// Fold the elapsed pause into the break total.
    pub fn resume(
        pool: &mut DbPool,
        cfg: &Config,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<WorkSession> {
        let tx = pool.tx()?;
        let mut session =
            sessions::find_open_session(&tx, &cfg.user_id)?.ok_or(AppError::NotTracking)?;
        let started = session
            .pause_started_at()
            .ok_or_else(|| AppError::Other("session is not paused".to_string()))?;

        let paused = (at - started).num_seconds().max(0);
        session.break_secs += paused;
        session.set_pause_started_at(None);
        session.synced = false;
        session.updated_at = now;
        sessions::update_session(&tx, &session)?;

        // Keep the cursor's cached pause total in step.
        let mut cursor = tracking::load_cursor(&tx)?;
        if cursor.session_id.as_deref() == Some(session.id.as_str()) {
            cursor.pause_secs = session.break_secs;
            cursor.updated_at = now;
            tracking::save_cursor(&tx, &cursor)?;
        }

        oplog(
            &tx,
            "resume",
            &session.id,
            &format!("paused {} min", paused / 60),
        )?;
        tx.commit()?;
        Ok(session)
    }

    /// Record an absence day (sick, vacation, ...) as a zero-minute marker
    /// session; the summary builder turns it into an `absence:<kind>` flag.
    pub fn mark_day_type(
        pool: &mut DbPool,
        cfg: &Config,
        date: NaiveDate,
        kind: &str,
        now: DateTime<Utc>,
    ) -> AppResult<WorkSession> {
        if kind.is_empty()
            || !kind
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(AppError::InvalidField(format!("day kind '{kind}'")));
        }

        let at = date.and_time(NaiveTime::MIN).and_utc();
        let mut marker = WorkSession::open(&cfg.user_id, None, None, at, SessionSource::Manual, 1.0, now);
        marker.exit_at = Some(at);
        marker.duration_min = Some(0);
        marker.set_day_type(kind);

        let tx = pool.tx()?;
        sessions::insert_session(&tx, &marker)?;
        Self::enqueue_day_refresh(&tx, &cfg.user_id, &marker.day_key(), now)?;
        queue::enqueue(&tx, &EffectRequest::SyncNow, now)?;
        queue::enqueue(&tx, &EffectRequest::UiRefresh, now)?;
        oplog(&tx, "absence", &marker.id, &format!("{} on {}", kind, marker.day_key()))?;
        tx.commit()?;
        Ok(marker)
    }

    pub fn create_fence(
        pool: &mut DbPool,
        cfg: &Config,
        name: &str,
        lat: f64,
        lng: f64,
        radius_m: f64,
        now: DateTime<Utc>,
    ) -> AppResult<GeofenceLocation> {
        Self::validate_geometry(lat, lng, radius_m)?;

        let tx = pool.tx()?;
        if locations::find_by_name(&tx, &cfg.user_id, name)?.is_some() {
            return Err(AppError::InvalidField(format!(
                "a fence named '{name}' already exists"
            )));
        }

        let fence = GeofenceLocation::new(&cfg.user_id, name, lat, lng, radius_m, now);
        locations::insert_location(&tx, &fence)?;
        Self::enqueue_fence_refresh(&tx, Some(&fence.id), now)?;
        oplog(&tx, "fence", &fence.id, &format!("created '{name}'"))?;
        tx.commit()?;
        Ok(fence)
    }

    pub fn update_fence(
        pool: &mut DbPool,
        cfg: &Config,
        key: &str,
        name: Option<&str>,
        lat: Option<f64>,
        lng: Option<f64>,
        radius_m: Option<f64>,
        now: DateTime<Utc>,
    ) -> AppResult<GeofenceLocation> {
        let tx = pool.tx()?;
        let mut fence = resolve_fence(&tx, &cfg.user_id, key)?;

        let geometry_changed = lat.is_some() || lng.is_some() || radius_m.is_some();
        if let Some(new_name) = name
            && new_name != fence.name
        {
            if locations::find_by_name(&tx, &cfg.user_id, new_name)?.is_some() {
                return Err(AppError::InvalidField(format!(
                    "a fence named '{new_name}' already exists"
                )));
            }
            fence.name = new_name.to_string();
        }
        if let Some(v) = lat {
            fence.lat = v;
        }
        if let Some(v) = lng {
            fence.lng = v;
        }
        if let Some(v) = radius_m {
            fence.radius_m = v;
        }
        Self::validate_geometry(fence.lat, fence.lng, fence.radius_m)?;

        fence.synced = false;
        fence.updated_at = now;
        locations::update_location(&tx, &fence)?;

        // Geometry moves re-register the fence and re-probe presence; a
        // pure rename only needs the mirror and the upload.
        Self::enqueue_fence_refresh(&tx, geometry_changed.then_some(fence.id.as_str()), now)?;
        oplog(&tx, "fence", &fence.id, "updated")?;
        tx.commit()?;
        Ok(fence)
    }

    pub fn delete_fence(
        pool: &mut DbPool,
        cfg: &Config,
        key: &str,
        now: DateTime<Utc>,
    ) -> AppResult<GeofenceLocation> {
        let tx = pool.tx()?;
        let mut fence = resolve_fence(&tx, &cfg.user_id, key)?;
        fence.deleted = true;
        fence.synced = false;
        fence.updated_at = now;
        locations::update_location(&tx, &fence)?;
        Self::enqueue_fence_refresh(&tx, None, now)?;
        oplog(&tx, "fence", &fence.id, &format!("deleted '{}'", fence.name))?;
        tx.commit()?;
        Ok(fence)
    }

    /// Roll one automated correction back to its recorded original, through
    /// the same edit path, re-labeled as a manual decision.
    pub fn undo_correction(
        pool: &mut DbPool,
        correction_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<AiCorrection> {
        let correction = corrections::get_correction(&pool.conn, correction_id)?
            .ok_or_else(|| AppError::CorrectionNotFound(correction_id.to_string()))?;
        if correction.reverted {
            return Err(AppError::Other(
                "correction was already undone".to_string(),
            ));
        }

        let edit = edit_for_field(&correction.field, correction.original_value.as_deref())?;
        Self::edit_session(pool, &correction.session_id, &edit, SessionSource::Manual, now)?;

        let mut reverted = correction;
        reverted.reverted = true;
        reverted.synced = false;
        reverted.updated_at = now;
        corrections::update_correction(&pool.conn, &reverted)?;
        oplog(
            &pool.conn,
            "undo",
            &reverted.id,
            &format!("restored {} on session {}", reverted.field, reverted.session_id),
        )?;
        Ok(reverted)
    }

    fn enqueue_day_refresh(
        conn: &Connection,
        user_id: &str,
        day: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        queue::enqueue(
            conn,
            &EffectRequest::RebuildDaySummary(SummaryScope {
                user_id: user_id.to_string(),
                date: day.to_string(),
            }),
            now,
        )?;
        Ok(())
    }

    /// Fence changes mirror to the OS and upload; geometry changes also
    /// schedule a delayed presence probe.
    fn enqueue_fence_refresh(
        conn: &Connection,
        probe_fence: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        queue::enqueue(conn, &EffectRequest::SyncFences, now)?;
        queue::enqueue(conn, &EffectRequest::SyncNow, now)?;
        if let Some(fence_id) = probe_fence {
            queue::enqueue_after(
                conn,
                &EffectRequest::FenceSettleProbe {
                    fence_id: fence_id.to_string(),
                },
                now,
                Some(now + Duration::seconds(SETTLE_DELAY_SECS)),
            )?;
        }
        Ok(())
    }

    fn validate_geometry(lat: f64, lng: f64, radius_m: f64) -> AppResult<()> {
        if radius_m < MIN_FENCE_RADIUS_M {
            return Err(AppError::FenceTooSmall(radius_m, MIN_FENCE_RADIUS_M));
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::InvalidField(format!(
                "coordinates ({lat}, {lng}) out of range"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::initialize::init_db;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn setup() -> (DbPool, Config) {
        let pool = DbPool::new(":memory:").unwrap();
        init_db(&pool.conn).unwrap();
        let mut cfg = Config::default();
        cfg.user_id = "u1".to_string();
        (pool, cfg)
    }

    fn closed_session(pool: &mut DbPool, cfg: &Config, mins: i64) -> WorkSession {
        let s = UseCaseLogic::start_manual(pool, cfg, None, SessionSource::Manual, t0(), t0())
            .unwrap();
        UseCaseLogic::stop(pool, cfg, t0() + Duration::minutes(mins), t0() + Duration::minutes(mins))
            .unwrap();
        sessions::get_session(&pool.conn, &s.id).unwrap().unwrap()
    }

    #[test]
    fn edit_recomputes_duration_and_marks_dirty() {
        let (mut pool, cfg) = setup();
        let s = closed_session(&mut pool, &cfg, 60);

        let edit = SessionEdit {
            exit_at: Some(t0() + Duration::minutes(90)),
            ..SessionEdit::default()
        };
        let edited =
            UseCaseLogic::edit_session(&mut pool, &s.id, &edit, SessionSource::Manual, t0()).unwrap();

        assert_eq!(edited.duration_min, Some(90));
        assert_eq!(edited.source, SessionSource::Manual);
        assert!(!edited.synced);
    }

    #[test]
    fn secretary_cannot_overwrite_a_manual_row() {
        let (mut pool, cfg) = setup();
        let s = closed_session(&mut pool, &cfg, 60);

        let edit = SessionEdit {
            break_min: Some(15),
            ..SessionEdit::default()
        };
        let err = UseCaseLogic::edit_session(&mut pool, &s.id, &edit, SessionSource::Secretary, t0())
            .unwrap_err();
        assert!(matches!(err, AppError::Outranked(_, _)));
    }

    #[test]
    fn edit_rejects_exit_before_enter() {
        let (mut pool, cfg) = setup();
        let s = closed_session(&mut pool, &cfg, 60);

        let edit = SessionEdit {
            exit_at: Some(t0() - Duration::minutes(5)),
            ..SessionEdit::default()
        };
        let err = UseCaseLogic::edit_session(&mut pool, &s.id, &edit, SessionSource::Manual, t0())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidField(_)));
    }

    #[test]
    fn deleting_the_open_session_clears_the_cursor() {
        let (mut pool, cfg) = setup();
        let s = UseCaseLogic::start_manual(&mut pool, &cfg, None, SessionSource::Manual, t0(), t0())
            .unwrap();

        UseCaseLogic::delete_session(&mut pool, &s.id, t0() + Duration::minutes(10)).unwrap();

        let row = sessions::get_session(&pool.conn, &s.id).unwrap().unwrap();
        assert!(row.deleted);
        assert!(!row.synced);
        assert!(tracking::load_cursor(&pool.conn).unwrap().is_idle());
        assert!(sessions::find_open_session(&pool.conn, "u1").unwrap().is_none());
    }

    #[test]
    fn pause_and_resume_fold_into_break() {
        let (mut pool, cfg) = setup();
        UseCaseLogic::start_manual(&mut pool, &cfg, None, SessionSource::Manual, t0(), t0())
            .unwrap();

        UseCaseLogic::pause(&mut pool, &cfg, t0() + Duration::hours(1), t0() + Duration::hours(1))
            .unwrap();
        let resumed = UseCaseLogic::resume(
            &mut pool,
            &cfg,
            t0() + Duration::minutes(90),
            t0() + Duration::minutes(90),
        )
        .unwrap();
        assert_eq!(resumed.break_secs, 1800);
        assert!(resumed.pause_started_at().is_none());

        let closed =
            UseCaseLogic::stop(&mut pool, &cfg, t0() + Duration::hours(3), t0() + Duration::hours(3))
                .unwrap();
        assert_eq!(closed.duration_min, Some(150));
    }

    #[test]
    fn double_pause_is_rejected() {
        let (mut pool, cfg) = setup();
        UseCaseLogic::start_manual(&mut pool, &cfg, None, SessionSource::Manual, t0(), t0())
            .unwrap();
        UseCaseLogic::pause(&mut pool, &cfg, t0(), t0()).unwrap();
        assert!(UseCaseLogic::pause(&mut pool, &cfg, t0(), t0()).is_err());
    }

    #[test]
    fn stop_overrides_a_pending_cooldown() {
        let (mut pool, cfg) = setup();
        let f = GeofenceLocation::new("u1", "Depot", 45.0, 9.0, 150.0, t0());
        locations::insert_location(&pool.conn, &f).unwrap();

        let enter = GeofenceEvent::foreground(FenceAction::Enter, &f.id, t0(), t0(), None);
        EngineLogic::handle_event(&mut pool, &cfg, &enter, t0()).unwrap();
        let exit = GeofenceEvent::foreground(
            FenceAction::Exit,
            &f.id,
            t0() + Duration::hours(2),
            t0() + Duration::hours(2),
            None,
        );
        EngineLogic::handle_event(&mut pool, &cfg, &exit, t0() + Duration::hours(2)).unwrap();

        let stop_at = t0() + Duration::hours(2) + Duration::minutes(10);
        let closed = UseCaseLogic::stop(&mut pool, &cfg, stop_at, stop_at).unwrap();
        assert_eq!(closed.exit_at, Some(stop_at));
        assert_eq!(closed.confidence, 1.0);
        assert!(tracking::load_cursor(&pool.conn).unwrap().is_idle());
    }

    #[test]
    fn second_manual_start_is_rejected() {
        let (mut pool, cfg) = setup();
        UseCaseLogic::start_manual(&mut pool, &cfg, None, SessionSource::Manual, t0(), t0())
            .unwrap();
        let err =
            UseCaseLogic::start_manual(&mut pool, &cfg, None, SessionSource::Manual, t0(), t0())
                .unwrap_err();
        assert!(matches!(err, AppError::AlreadyTracking));
    }

    #[test]
    fn absence_marker_is_zero_minutes() {
        let (mut pool, cfg) = setup();
        let date = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        let marker = UseCaseLogic::mark_day_type(&mut pool, &cfg, date, "sick", t0()).unwrap();

        assert_eq!(marker.duration_min, Some(0));
        assert_eq!(marker.day_type().as_deref(), Some("sick"));
        assert_eq!(marker.day_key(), "2025-03-12");

        let err = UseCaseLogic::mark_day_type(&mut pool, &cfg, date, "Sick Day", t0()).unwrap_err();
        assert!(matches!(err, AppError::InvalidField(_)));
    }

    #[test]
    fn fence_below_minimum_radius_is_rejected() {
        let (mut pool, cfg) = setup();
        let err = UseCaseLogic::create_fence(&mut pool, &cfg, "Tiny", 45.0, 9.0, 50.0, t0())
            .unwrap_err();
        assert!(matches!(err, AppError::FenceTooSmall(_, _)));
    }

    #[test]
    fn duplicate_fence_name_is_rejected() {
        let (mut pool, cfg) = setup();
        UseCaseLogic::create_fence(&mut pool, &cfg, "Depot", 45.0, 9.0, 150.0, t0()).unwrap();
        let err = UseCaseLogic::create_fence(&mut pool, &cfg, "Depot", 46.0, 9.0, 150.0, t0())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidField(_)));
    }

    #[test]
    fn fence_create_schedules_mirror_and_delayed_probe() {
        let (mut pool, cfg) = setup();
        UseCaseLogic::create_fence(&mut pool, &cfg, "Depot", 45.0, 9.0, 150.0, t0()).unwrap();

        let kinds: Vec<String> = {
            let mut stmt = pool
                .conn
                .prepare("SELECT kind FROM effects_queue ORDER BY id")
                .unwrap();
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
            rows
        };
        assert!(kinds.contains(&"sync_fences".to_string()));
        assert!(kinds.contains(&"fence_settle_probe".to_string()));

        // The probe is delayed, not immediate.
        let due_now = queue::due_effects(&pool.conn, t0(), 50).unwrap();
        assert!(due_now.iter().all(|e| e.kind.to_db_str() != "fence_settle_probe"));
        let due_later =
            queue::due_effects(&pool.conn, t0() + Duration::seconds(SETTLE_DELAY_SECS), 50).unwrap();
        assert!(due_later.iter().any(|e| e.kind.to_db_str() == "fence_settle_probe"));
    }

    #[test]
    fn rename_does_not_schedule_a_probe_but_moving_does() {
        let (mut pool, cfg) = setup();
        let f = UseCaseLogic::create_fence(&mut pool, &cfg, "Depot", 45.0, 9.0, 150.0, t0()).unwrap();
        let probes = |pool: &DbPool| -> i64 {
            pool.conn
                .query_row(
                    "SELECT COUNT(*) FROM effects_queue WHERE kind = 'fence_settle_probe'",
                    [],
                    |r| r.get(0),
                )
                .unwrap()
        };
        let baseline = probes(&pool);

        UseCaseLogic::update_fence(&mut pool, &cfg, &f.id, Some("Yard"), None, None, None, t0())
            .unwrap();
        assert_eq!(probes(&pool), baseline);

        UseCaseLogic::update_fence(&mut pool, &cfg, &f.id, None, Some(45.01), None, None, t0())
            .unwrap();
        assert_eq!(probes(&pool), baseline + 1);
    }

    #[test]
    fn undo_restores_the_original_and_marks_reverted() {
        let (mut pool, cfg) = setup();
        let s = closed_session(&mut pool, &cfg, 60);
        let original_exit = s.exit_at.unwrap();

        // An automated exit trim, recorded the way the AI apply path does.
        let moved = original_exit - Duration::minutes(20);
        let correction = AiCorrection::new(
            &s.id,
            "u1",
            "exit_at",
            Some(crate::db::db_utils::ts(original_exit)),
            Some(crate::db::db_utils::ts(moved)),
            "trailing idle trimmed",
            t0(),
        );
        corrections::insert_correction(&pool.conn, &correction).unwrap();
        // The row was manual; relabel so the secretary edit is allowed.
        pool.conn
            .execute("UPDATE work_sessions SET source = 'gps' WHERE id = ?1", [&s.id])
            .unwrap();
        let edit = SessionEdit {
            exit_at: Some(moved),
            ..SessionEdit::default()
        };
        UseCaseLogic::edit_session(&mut pool, &s.id, &edit, SessionSource::Secretary, t0()).unwrap();

        let undone = UseCaseLogic::undo_correction(&mut pool, &correction.id, t0()).unwrap();
        assert!(undone.reverted);

        let restored = sessions::get_session(&pool.conn, &s.id).unwrap().unwrap();
        assert_eq!(restored.exit_at, Some(original_exit));
        assert_eq!(restored.source, SessionSource::Manual);
        assert_eq!(restored.duration_min, Some(60));

        let err = UseCaseLogic::undo_correction(&mut pool, &correction.id, t0()).unwrap_err();
        assert!(matches!(err, AppError::Other(_)));
    }
}
