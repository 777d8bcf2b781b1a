//! Periodic heartbeat: the app's defense against missed OS signals.
//!
//! Geofence delivery is best-effort, so every ~5 minutes (and on app
//! foreground) a tick runs the same four checks in the same order: confirm
//! an elapsed exit cooldown, drain the effects queue, sweep long-running
//! session guards, and reality-check the tracked fence against a fresh
//! location fix. A missing fix is treated as no information, never as
//! evidence the worker left.

use crate::config::Config;
use crate::core::effects::{DrainReport, EffectsLogic};
use crate::core::engine::EngineLogic;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::{guard, locations, queue, sessions, tracking};
use crate::errors::AppResult;
use crate::models::effect::{EffectRequest, Notification};
use crate::models::event::{FenceAction, GeofenceEvent};
use crate::models::tracking::TrackingStatus;
use crate::platform::AppEnv;
use chrono::{DateTime, Duration, Utc};

/// One nudge after this many hours of continuous tracking.
pub const GUARD_WARN_HOURS: i64 = 10;

/// Hard ceiling: sessions are force-closed at enter + this many hours.
pub const GUARD_FORCE_HOURS: i64 = 16;

/// Confidence stamped on a guard force close. Lowest of all synthesized
/// signals; the exit time is a guess, not an observation.
pub const FORCED_EXIT_CONFIDENCE: f64 = 0.3;

/// Confidence of an exit synthesized from consecutive outside fixes.
pub const WATCHDOG_EXIT_CONFIDENCE: f64 = 0.6;

/// Consecutive outside fixes before the watchdog concludes the OS lost the
/// exit event. One alone is written off as GPS noise.
pub const OUTSIDE_FIXES_FOR_EXIT: i64 = 2;

/// What the fix check concluded this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    /// Not tracking a fence; nothing to verify.
    NotTracking,
    /// No usable fix or unknown fence. Inconclusive by rule.
    Unavailable,
    Inside,
    /// Outside, but not yet enough consecutive fixes to act.
    Outside(i64),
    /// Threshold hit: an exit was fed through the engine.
    ExitSynthesized,
}

#[derive(Debug)]
pub struct TickReport {
    pub cooldown_confirmed: bool,
    pub effects: DrainReport,
    pub warned: usize,
    pub forced: usize,
    pub fix: FixOutcome,
}

pub struct WatchdogLogic;

impl WatchdogLogic {
    /// One heartbeat. Also invoked on app foreground.
    pub fn tick(
        pool: &mut DbPool,
        cfg: &Config,
        env: &AppEnv,
        now: DateTime<Utc>,
    ) -> AppResult<TickReport> {
        // 1) An exit cooldown may have elapsed while nothing was running.
        let cooldown_confirmed = {
            let tx = pool.tx()?;
            let hit = EngineLogic::check_cooldown(&tx, now)?;
            tx.commit()?;
            hit
        };

        // 2) Retry whatever the queue holds.
        let effects = EffectsLogic::drain(pool, cfg, env, now)?;

        // 3) Long-session guards.
        let (warned, forced) = Self::sweep_guards(pool, now)?;

        // 4) Reality check, only while actively tracking.
        let fix = Self::check_fix(pool, cfg, env, now)?;

        Ok(TickReport {
            cooldown_confirmed,
            effects,
            warned,
            forced,
            fix,
        })
    }

    /// Forgotten-exit protection. At 10h a one-time notification, at 16h a
    /// forced close backdated to enter + 16h.
    fn sweep_guards(pool: &mut DbPool, now: DateTime<Utc>) -> AppResult<(usize, usize)> {
        let guards = guard::active_guards(&pool.conn)?;
        let mut warned = 0;
        let mut forced = 0;

        for g in guards {
            let session = sessions::get_session(&pool.conn, &g.session_id)?;
            if !session.as_ref().is_some_and(|s| s.is_open()) {
                // Guard outlived its session (cancel effect still queued).
                guard::cancel_guard(&pool.conn, &g.session_id)?;
                continue;
            }
            let elapsed = now - g.started_at;

            if elapsed >= Duration::hours(GUARD_FORCE_HOURS) {
                let close_at = g.started_at + Duration::hours(GUARD_FORCE_HOURS);
                let tx = pool.tx()?;
                EngineLogic::confirm_exit(
                    &tx,
                    &g.session_id,
                    close_at,
                    Some(FORCED_EXIT_CONFIDENCE),
                    "session guard ceiling",
                    now,
                )?;
                guard::cancel_guard(&tx, &g.session_id)?;
                oplog(
                    &tx,
                    "guard",
                    &g.session_id,
                    &format!("forced close after {}h", GUARD_FORCE_HOURS),
                )?;
                tx.commit()?;
                forced += 1;
            } else if elapsed >= Duration::hours(GUARD_WARN_HOURS) && !g.warned {
                let site = session
                    .as_ref()
                    .and_then(|s| s.location_name.clone())
                    .unwrap_or_else(|| "site".to_string());
                queue::enqueue(
                    &pool.conn,
                    &EffectRequest::Notify(Notification {
                        title: "Still on site?".to_string(),
                        body: format!(
                            "Tracking at {} for over {} hours. Forgot to clock out?",
                            site, GUARD_WARN_HOURS
                        ),
                    }),
                    now,
                )?;
                guard::mark_warned(&pool.conn, &g.session_id, now)?;
                oplog(&pool.conn, "guard", &g.session_id, "long session warning")?;
                warned += 1;
            }
        }

        Ok((warned, forced))
    }

    /// Compare a fresh fix against the tracked fence. Two consecutive
    /// outside fixes mean the OS swallowed the exit; synthesize one.
    fn check_fix(
        pool: &mut DbPool,
        cfg: &Config,
        env: &AppEnv,
        now: DateTime<Utc>,
    ) -> AppResult<FixOutcome> {
        let cursor = tracking::load_cursor(&pool.conn)?;
        if cursor.status != TrackingStatus::Tracking {
            return Ok(FixOutcome::NotTracking);
        }
        // A manually started session may have no fence behind it.
        let Some(fence_id) = cursor.fence_id.clone() else {
            return Ok(FixOutcome::NotTracking);
        };

        let Ok(fix) = env.location.current_fix() else {
            return Ok(FixOutcome::Unavailable);
        };
        let Some(fence) = locations::get_location(&pool.conn, &fence_id)? else {
            return Ok(FixOutcome::Unavailable);
        };

        if fence.contains(&fix) {
            if cursor.outside_count != 0 {
                let mut next = cursor.clone();
                next.outside_count = 0;
                next.updated_at = now;
                tracking::save_cursor(&pool.conn, &next)?;
            }
            return Ok(FixOutcome::Inside);
        }

        let outside = cursor.outside_count + 1;
        if outside >= OUTSIDE_FIXES_FOR_EXIT {
            let ev = GeofenceEvent::synthetic(
                FenceAction::Exit,
                &fence_id,
                now,
                WATCHDOG_EXIT_CONFIDENCE,
                Some(fix),
            );
            EngineLogic::handle_event(pool, cfg, &ev, now)?;
            oplog(
                &pool.conn,
                "watchdog",
                &fence_id,
                &format!("synthesized exit after {} outside fixes", outside),
            )?;
            Ok(FixOutcome::ExitSynthesized)
        } else {
            let mut next = cursor.clone();
            next.outside_count = outside;
            next.updated_at = now;
            tracking::save_cursor(&pool.conn, &next)?;
            Ok(FixOutcome::Outside(outside))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::effects::DRAIN_TESTS;
    use crate::db::initialize::init_db;
    use crate::models::event::LocationFix;
    use crate::models::location::GeofenceLocation;
    use chrono::TimeZone;
    use std::sync::PoisonError;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
    }

    fn setup() -> (DbPool, Config) {
        let pool = DbPool::new(":memory:").unwrap();
        init_db(&pool.conn).unwrap();
        let mut cfg = Config::default();
        cfg.user_id = "u1".to_string();
        (pool, cfg)
    }

    fn enter_at(pool: &mut DbPool, cfg: &Config, fence_id: &str, at: DateTime<Utc>) -> String {
        let ev = GeofenceEvent::foreground(FenceAction::Enter, fence_id, at, at, None);
        let out = EngineLogic::handle_event(pool, cfg, &ev, at).unwrap();
        out.session_id.unwrap()
    }

    fn session_row(pool: &DbPool, id: &str) -> crate::models::session::WorkSession {
        sessions::get_session(&pool.conn, id).unwrap().unwrap()
    }

    #[test]
    fn guard_warns_once_after_ten_hours() {
        let _lock = DRAIN_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut pool, cfg) = setup();
        let env = AppEnv::cli(None);

        let sid = enter_at(&mut pool, &cfg, "f1", t0());
        EffectsLogic::drain(&mut pool, &cfg, &env, t0()).unwrap();

        let report = WatchdogLogic::tick(&mut pool, &cfg, &env, t0() + Duration::hours(11)).unwrap();
        assert_eq!(report.warned, 1);
        assert_eq!(report.forced, 0);
        // Tracking an unknown fence with no fix available: inconclusive.
        assert_eq!(report.fix, FixOutcome::Unavailable);

        let again =
            WatchdogLogic::tick(&mut pool, &cfg, &env, t0() + Duration::hours(11) + Duration::minutes(5))
                .unwrap();
        assert_eq!(again.warned, 0);

        let notifies: i64 = pool
            .conn
            .query_row(
                "SELECT COUNT(*) FROM effects_queue WHERE kind = 'notify'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(notifies, 1);

        assert!(session_row(&pool, &sid).is_open());
    }

    #[test]
    fn guard_force_closes_at_sixteen_hours() {
        let _lock = DRAIN_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut pool, cfg) = setup();
        let env = AppEnv::cli(None);

        let sid = enter_at(&mut pool, &cfg, "f1", t0());
        EffectsLogic::drain(&mut pool, &cfg, &env, t0()).unwrap();

        let report = WatchdogLogic::tick(&mut pool, &cfg, &env, t0() + Duration::hours(17)).unwrap();
        assert_eq!(report.forced, 1);

        let s = session_row(&pool, &sid);
        assert_eq!(s.exit_at, Some(t0() + Duration::hours(16)));
        assert_eq!(s.duration_min, Some(16 * 60));
        assert_eq!(s.confidence, FORCED_EXIT_CONFIDENCE);

        let cursor = tracking::load_cursor(&pool.conn).unwrap();
        assert!(cursor.is_idle());
    }

    #[test]
    fn two_consecutive_outside_fixes_synthesize_an_exit() {
        let _lock = DRAIN_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut pool, cfg) = setup();

        let fence = GeofenceLocation::new("u1", "Depot", 45.0, 9.0, 150.0, t0());
        locations::insert_location(&pool.conn, &fence).unwrap();

        // ~333 m north of center, well outside the 150 m radius.
        let outside_fix = LocationFix {
            lat: 45.003,
            lng: 9.0,
            accuracy_m: 10.0,
        };
        let env = AppEnv::cli(Some(outside_fix));

        let sid = enter_at(&mut pool, &cfg, &fence.id, t0());
        EffectsLogic::drain(&mut pool, &cfg, &env, t0()).unwrap();

        let first = WatchdogLogic::tick(&mut pool, &cfg, &env, t0() + Duration::minutes(5)).unwrap();
        assert_eq!(first.fix, FixOutcome::Outside(1));
        assert!(session_row(&pool, &sid).is_open());

        let second = WatchdogLogic::tick(&mut pool, &cfg, &env, t0() + Duration::minutes(10)).unwrap();
        assert_eq!(second.fix, FixOutcome::ExitSynthesized);

        // Exit went pending, not straight to closed.
        let cursor = tracking::load_cursor(&pool.conn).unwrap();
        assert_eq!(cursor.status, TrackingStatus::ExitPending);
        assert_eq!(cursor.pending_exit_at, Some(t0() + Duration::minutes(10)));

        // Next tick is past the cooldown: the exit confirms.
        let third = WatchdogLogic::tick(&mut pool, &cfg, &env, t0() + Duration::minutes(15)).unwrap();
        assert!(third.cooldown_confirmed);

        let s = session_row(&pool, &sid);
        assert_eq!(s.exit_at, Some(t0() + Duration::minutes(10)));
        assert_eq!(s.confidence, WATCHDOG_EXIT_CONFIDENCE);
    }

    #[test]
    fn inside_fix_resets_the_outside_streak() {
        let _lock = DRAIN_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut pool, cfg) = setup();

        let fence = GeofenceLocation::new("u1", "Depot", 45.0, 9.0, 150.0, t0());
        locations::insert_location(&pool.conn, &fence).unwrap();

        let env_out = AppEnv::cli(Some(LocationFix {
            lat: 45.003,
            lng: 9.0,
            accuracy_m: 10.0,
        }));
        let env_in = AppEnv::cli(Some(LocationFix {
            lat: 45.0003,
            lng: 9.0,
            accuracy_m: 10.0,
        }));

        let sid = enter_at(&mut pool, &cfg, &fence.id, t0());

        let a = WatchdogLogic::tick(&mut pool, &cfg, &env_out, t0() + Duration::minutes(5)).unwrap();
        assert_eq!(a.fix, FixOutcome::Outside(1));

        let b = WatchdogLogic::tick(&mut pool, &cfg, &env_in, t0() + Duration::minutes(10)).unwrap();
        assert_eq!(b.fix, FixOutcome::Inside);
        assert_eq!(tracking::load_cursor(&pool.conn).unwrap().outside_count, 0);

        // The streak restarts; one outside fix is again not enough.
        let c = WatchdogLogic::tick(&mut pool, &cfg, &env_out, t0() + Duration::minutes(15)).unwrap();
        assert_eq!(c.fix, FixOutcome::Outside(1));
        assert!(session_row(&pool, &sid).is_open());
    }
}
