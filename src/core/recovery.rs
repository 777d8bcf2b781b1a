//! Crash and reinstall recovery.
//!
//! The session rows are the durable truth; the tracking cursor is a cache
//! that can go stale whenever the process dies mid-transition. Boot
//! reconciles the two, and when nothing is open it may synthesize an ENTER
//! from a location probe. It never synthesizes an EXIT: "the app was dead
//! and we cannot see the worker" is not evidence they left, and the session
//! guard already bounds how long a forgotten session can run.

use crate::config::Config;
use crate::core::engine::EngineLogic;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::{locations, sessions, tracking};
use crate::errors::AppResult;
use crate::models::event::{FenceAction, GeofenceEvent, LocationFix};
use crate::models::location::GeofenceLocation;
use crate::models::tracking::{ActiveTracking, TrackingStatus};
use crate::platform::AppEnv;
use chrono::{DateTime, Utc};

/// Confidence of an enter synthesized at boot. The worker is provably
/// inside right now, but the true arrival time is unknown.
pub const RECOVERY_ENTER_CONFIDENCE: f64 = 0.5;

/// Wait this long after a fence is created or moved before probing it:
/// lets the OS geofencing layer settle and the first fix stabilize.
pub const SETTLE_DELAY_SECS: i64 = 10;

/// Confidence of transitions synthesized by the settle probe. Higher than
/// boot recovery: the fence change just happened, so timing is tight.
pub const SETTLE_CONFIDENCE: f64 = 0.7;

/// A settle probe only synthesizes an EXIT when the fix is at least this
/// accurate. Enters tolerate noise; ending a session on a sloppy fix is
/// how minutes get eaten.
pub const SETTLE_EXIT_MAX_ACCURACY_M: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// Cursor and sessions already agreed.
    Clean,
    /// Open session found with a stale cursor: cursor rebuilt, no new rows.
    Rehydrated { session_id: String },
    /// Cursor pointed at a closed or missing session: reset to IDLE.
    CursorReset,
    /// Nothing open but the probe landed inside a fence: entered.
    EnterSynthesized { fence_name: String },
}

#[derive(Debug)]
pub struct BootReport {
    pub cooldown_confirmed: bool,
    pub outcome: BootOutcome,
}

pub struct RecoveryLogic;

impl RecoveryLogic {
    /// Reconcile tracking state after a cold start.
    pub fn boot(
        pool: &mut DbPool,
        cfg: &Config,
        env: &AppEnv,
        now: DateTime<Utc>,
    ) -> AppResult<BootReport> {
        // A cooldown may have elapsed while the process was dead.
        let cooldown_confirmed = {
            let tx = pool.tx()?;
            let hit = EngineLogic::check_cooldown(&tx, now)?;
            tx.commit()?;
            hit
        };

        let mut outcome = Self::reconcile(pool, cfg, now)?;

        // Only probe when nothing is open; boot never closes anything.
        if sessions::find_open_session(&pool.conn, &cfg.user_id)?.is_none()
            && let Some(fence_name) = Self::probe_enter(pool, cfg, env, now)?
        {
            outcome = BootOutcome::EnterSynthesized { fence_name };
        }

        Ok(BootReport {
            cooldown_confirmed,
            outcome,
        })
    }

    fn reconcile(pool: &mut DbPool, cfg: &Config, now: DateTime<Utc>) -> AppResult<BootOutcome> {
        let tx = pool.tx()?;
        let cursor = tracking::load_cursor(&tx)?;
        let open = sessions::find_open_session(&tx, &cfg.user_id)?;

        let outcome = match open {
            Some(session) => {
                let points_at_open = cursor.session_id.as_deref() == Some(session.id.as_str());
                if points_at_open && !cursor.is_idle() {
                    // EXIT_PENDING included: the cooldown path owns it.
                    BootOutcome::Clean
                } else {
                    EngineLogic::rehydrate_cursor(&tx, &session, now)?;
                    oplog(
                        &tx,
                        "recover",
                        &session.id,
                        "cursor rehydrated from open session",
                    )?;
                    BootOutcome::Rehydrated {
                        session_id: session.id,
                    }
                }
            }
            None => {
                if cursor.is_idle() && cursor.session_id.is_none() {
                    BootOutcome::Clean
                } else {
                    tracking::save_cursor(&tx, &ActiveTracking::idle(now))?;
                    oplog(
                        &tx,
                        "recover",
                        cursor.session_id.as_deref().unwrap_or(""),
                        "cursor pointed at a closed or missing session, reset",
                    )?;
                    BootOutcome::CursorReset
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// If a fresh fix lands inside an active fence, enter it at reduced
    /// confidence. Returns the fence name when it fired.
    fn probe_enter(
        pool: &mut DbPool,
        cfg: &Config,
        env: &AppEnv,
        now: DateTime<Utc>,
    ) -> AppResult<Option<String>> {
        let Ok(fix) = env.location.current_fix() else {
            return Ok(None);
        };
        let fences = locations::list_active(&pool.conn, &cfg.user_id)?;
        let Some(fence) = Self::best_containing(&fences, &fix) else {
            return Ok(None);
        };
        let fence_id = fence.id.clone();
        let fence_name = fence.name.clone();

        let ev = GeofenceEvent::synthetic(
            FenceAction::Enter,
            &fence_id,
            now,
            RECOVERY_ENTER_CONFIDENCE,
            Some(fix),
        );
        EngineLogic::handle_event(pool, cfg, &ev, now)?;
        oplog(
            &pool.conn,
            "recover",
            &fence_id,
            "boot probe found the worker inside, entered",
        )?;
        Ok(Some(fence_name))
    }

    /// Delayed probe queued when a fence is created or its geometry moves.
    /// The OS will not replay an enter for someone already standing inside,
    /// so the app checks by hand once the dust settles.
    pub fn settle_probe(
        pool: &mut DbPool,
        cfg: &Config,
        env: &AppEnv,
        fence_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        // Fence may be gone by the time the delayed effect runs.
        let Some(fence) = locations::get_location(&pool.conn, fence_id)? else {
            return Ok(());
        };
        if fence.deleted {
            return Ok(());
        }
        let Ok(fix) = env.location.current_fix() else {
            return Ok(());
        };

        let cursor = tracking::load_cursor(&pool.conn)?;
        let inside = fence.contains(&fix);

        if inside && cursor.is_idle() {
            let ev = GeofenceEvent::synthetic(
                FenceAction::Enter,
                fence_id,
                now,
                SETTLE_CONFIDENCE,
                Some(fix),
            );
            EngineLogic::handle_event(pool, cfg, &ev, now)?;
            oplog(&pool.conn, "recover", fence_id, "settle probe entered")?;
        } else if !inside
            && cursor.status == TrackingStatus::Tracking
            && cursor.fence_id.as_deref() == Some(fence_id)
            && fix.accuracy_m < SETTLE_EXIT_MAX_ACCURACY_M
        {
            // The fence moved out from under an active session.
            let ev = GeofenceEvent::synthetic(
                FenceAction::Exit,
                fence_id,
                now,
                SETTLE_CONFIDENCE,
                Some(fix),
            );
            EngineLogic::handle_event(pool, cfg, &ev, now)?;
            oplog(&pool.conn, "recover", fence_id, "settle probe started exit cooldown")?;
        }

        Ok(())
    }

    fn best_containing<'a>(
        fences: &'a [GeofenceLocation],
        fix: &LocationFix,
    ) -> Option<&'a GeofenceLocation> {
        fences
            .iter()
            .filter(|f| f.contains(fix))
            .min_by(|a, b| {
                a.distance_m(fix)
                    .partial_cmp(&b.distance_m(fix))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::initialize::init_db;
    use crate::db::queue;
    use crate::models::source::SessionSource;
    use chrono::{Duration, TimeZone};
    use rusqlite::params;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
    }

    fn setup() -> (DbPool, Config) {
        let pool = DbPool::new(":memory:").unwrap();
        init_db(&pool.conn).unwrap();
        let mut cfg = Config::default();
        cfg.user_id = "u1".to_string();
        (pool, cfg)
    }

    fn fence(pool: &DbPool, name: &str, lat: f64, lng: f64) -> GeofenceLocation {
        let f = GeofenceLocation::new("u1", name, lat, lng, 150.0, t0());
        locations::insert_location(&pool.conn, &f).unwrap();
        f
    }

    fn enter(pool: &mut DbPool, cfg: &Config, fence_id: &str, at: DateTime<Utc>) -> String {
        let ev = GeofenceEvent::foreground(FenceAction::Enter, fence_id, at, at, None);
        EngineLogic::handle_event(pool, cfg, &ev, at)
            .unwrap()
            .session_id
            .unwrap()
    }

    #[test]
    fn boot_rehydrates_from_open_session_without_new_rows() {
        let (mut pool, cfg) = setup();
        let env = AppEnv::cli(None);

        let sid = enter(&mut pool, &cfg, "f1", t0());
        // Simulate a crash that lost the cursor but kept the session.
        tracking::save_cursor(&pool.conn, &ActiveTracking::idle(t0())).unwrap();

        let report = RecoveryLogic::boot(&mut pool, &cfg, &env, t0() + Duration::hours(1)).unwrap();
        assert_eq!(
            report.outcome,
            BootOutcome::Rehydrated {
                session_id: sid.clone()
            }
        );

        let cursor = tracking::load_cursor(&pool.conn).unwrap();
        assert_eq!(cursor.status, TrackingStatus::Tracking);
        assert_eq!(cursor.session_id, Some(sid));
        assert_eq!(sessions::count_sessions(&pool.conn).unwrap(), 1);
    }

    #[test]
    fn boot_resets_cursor_left_on_a_closed_session() {
        let (mut pool, cfg) = setup();
        let env = AppEnv::cli(None);

        let sid = enter(&mut pool, &cfg, "f1", t0());
        // Close the row behind the cursor's back.
        pool.conn
            .execute(
                "UPDATE work_sessions SET exit_at = ?1, duration_min = 60 WHERE id = ?2",
                params![crate::db::db_utils::ts(t0() + Duration::hours(1)), sid],
            )
            .unwrap();

        let report = RecoveryLogic::boot(&mut pool, &cfg, &env, t0() + Duration::hours(2)).unwrap();
        assert_eq!(report.outcome, BootOutcome::CursorReset);
        assert!(tracking::load_cursor(&pool.conn).unwrap().is_idle());
    }

    #[test]
    fn boot_enters_when_probe_lands_inside_a_fence() {
        let (mut pool, cfg) = setup();
        let f = fence(&pool, "Depot", 45.0, 9.0);
        let env = AppEnv::cli(Some(LocationFix {
            lat: 45.0003,
            lng: 9.0,
            accuracy_m: 15.0,
        }));

        let report = RecoveryLogic::boot(&mut pool, &cfg, &env, t0()).unwrap();
        assert_eq!(
            report.outcome,
            BootOutcome::EnterSynthesized {
                fence_name: "Depot".to_string()
            }
        );

        let open = sessions::find_open_session(&pool.conn, "u1").unwrap().unwrap();
        assert_eq!(open.location_id, Some(f.id));
        assert_eq!(open.confidence, RECOVERY_ENTER_CONFIDENCE);
        assert_eq!(open.enter_at, t0());
        assert_eq!(open.source, SessionSource::Gps);
    }

    #[test]
    fn boot_never_synthesizes_an_exit() {
        let (mut pool, cfg) = setup();
        let f = fence(&pool, "Depot", 45.0, 9.0);
        // Probe far outside the tracked fence.
        let env = AppEnv::cli(Some(LocationFix {
            lat: 46.0,
            lng: 9.0,
            accuracy_m: 5.0,
        }));

        let sid = enter(&mut pool, &cfg, &f.id, t0());

        let report = RecoveryLogic::boot(&mut pool, &cfg, &env, t0() + Duration::hours(3)).unwrap();
        assert_eq!(report.outcome, BootOutcome::Clean);
        assert!(sessions::get_session(&pool.conn, &sid).unwrap().unwrap().is_open());
    }

    #[test]
    fn settle_probe_enters_an_idle_worker_standing_inside() {
        let (mut pool, cfg) = setup();
        let f = fence(&pool, "Depot", 45.0, 9.0);
        let env = AppEnv::cli(Some(LocationFix {
            lat: 45.0003,
            lng: 9.0,
            accuracy_m: 20.0,
        }));

        RecoveryLogic::settle_probe(&mut pool, &cfg, &env, &f.id, t0()).unwrap();

        let open = sessions::find_open_session(&pool.conn, "u1").unwrap().unwrap();
        assert_eq!(open.confidence, SETTLE_CONFIDENCE);
    }

    #[test]
    fn settle_probe_ignores_outside_fix_with_poor_accuracy() {
        let (mut pool, cfg) = setup();
        let f = fence(&pool, "Depot", 45.0, 9.0);
        enter(&mut pool, &cfg, &f.id, t0());

        let sloppy = AppEnv::cli(Some(LocationFix {
            lat: 45.003,
            lng: 9.0,
            accuracy_m: 80.0,
        }));
        RecoveryLogic::settle_probe(&mut pool, &cfg, &sloppy, &f.id, t0() + Duration::minutes(1))
            .unwrap();
        assert_eq!(
            tracking::load_cursor(&pool.conn).unwrap().status,
            TrackingStatus::Tracking
        );

        let tight = AppEnv::cli(Some(LocationFix {
            lat: 45.003,
            lng: 9.0,
            accuracy_m: 20.0,
        }));
        RecoveryLogic::settle_probe(&mut pool, &cfg, &tight, &f.id, t0() + Duration::minutes(2))
            .unwrap();
        assert_eq!(
            tracking::load_cursor(&pool.conn).unwrap().status,
            TrackingStatus::ExitPending
        );
    }

    #[test]
    fn queued_settle_probe_is_not_due_before_its_delay() {
        let (pool, _cfg) = setup();
        queue::enqueue_after(
            &pool.conn,
            &crate::models::effect::EffectRequest::FenceSettleProbe {
                fence_id: "f1".to_string(),
            },
            t0(),
            Some(t0() + Duration::seconds(SETTLE_DELAY_SECS)),
        )
        .unwrap();

        assert!(queue::due_effects(&pool.conn, t0(), 10).unwrap().is_empty());
        assert_eq!(
            queue::due_effects(&pool.conn, t0() + Duration::seconds(SETTLE_DELAY_SECS), 10)
                .unwrap()
                .len(),
            1
        );
    }
}
