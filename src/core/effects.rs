//! Executor for the durable effects queue.
//!
//! Enqueuing is cheap and happens inside engine transactions; this module
//! is the other half: it pulls eligible rows in insertion order, runs the
//! handler for each, and records the outcome. A drain is single-flight per
//! process and bounded in passes, so handlers that enqueue follow-up work
//! (a settle probe feeding the engine, for example) get served without the
//! loop ever becoming unbounded.

use crate::config::Config;
use crate::core::ai::AiLogic;
use crate::core::recovery::RecoveryLogic;
use crate::core::summary::SummaryLogic;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::{guard, locations, queue};
use crate::errors::AppResult;
use crate::models::effect::{EffectPriority, EffectRequest, QueuedEffect};
use crate::platform::AppEnv;
use crate::sync::engine::SyncEngine;
use crate::utils::date::parse_date;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

/// Retry ladder in minutes. The index is attempts-1, capped at the top rung.
pub const BACKOFF_LADDER_MIN: [i64; 4] = [1, 5, 15, 60];

/// Normal effects dead-letter after this many failed attempts. Critical
/// effects never do.
pub const MAX_NORMAL_ATTEMPTS: i64 = 3;

/// Upper bound on drain passes in one call. Each pass re-queries, so work
/// enqueued by handlers still runs; a pathological self-feeding effect
/// cannot spin forever.
const MAX_DRAIN_PASSES: usize = 4;

const DRAIN_BATCH: usize = 64;

static DRAINING: AtomicBool = AtomicBool::new(false);

// Tests that drain (here and in the watchdog) serialize on this: the
// single-flight flag above is process-wide and cargo runs tests in
// parallel.
#[cfg(test)]
pub(crate) static DRAIN_TESTS: std::sync::Mutex<()> = std::sync::Mutex::new(());

struct DrainToken;

impl Drop for DrainToken {
    fn drop(&mut self) {
        DRAINING.store(false, Ordering::SeqCst);
    }
}

/// Where the retry clock lands after a failure.
///
/// Offline failures ignore the attempt count: there is no point in backing
/// off an hour when the radio may come back in a minute.
pub fn backoff_minutes(attempts: i64, offline: bool) -> i64 {
    if offline {
        return BACKOFF_LADDER_MIN[0];
    }
    let idx = ((attempts - 1).max(0) as usize).min(BACKOFF_LADDER_MIN.len() - 1);
    BACKOFF_LADDER_MIN[idx]
}

#[derive(Debug, Default)]
pub struct DrainReport {
    pub executed: usize,
    pub retried: usize,
    pub dead: usize,
    /// Another drain was already running; nothing was touched.
    pub skipped: bool,
}

pub struct EffectsLogic;

impl EffectsLogic {
    /// Run every eligible pending effect, oldest first.
    pub fn drain(
        pool: &mut DbPool,
        cfg: &Config,
        env: &AppEnv,
        now: DateTime<Utc>,
    ) -> AppResult<DrainReport> {
        if DRAINING.swap(true, Ordering::SeqCst) {
            return Ok(DrainReport {
                skipped: true,
                ..DrainReport::default()
            });
        }
        let _token = DrainToken;

        let mut report = DrainReport::default();

        for _pass in 0..MAX_DRAIN_PASSES {
            let due = queue::due_effects(&pool.conn, now, DRAIN_BATCH)?;
            if due.is_empty() {
                break;
            }

            for item in due {
                match Self::execute(pool, cfg, env, &item, now) {
                    Ok(()) => {
                        queue::mark_done(&pool.conn, item.id, now)?;
                        report.executed += 1;
                    }
                    Err(e) => {
                        Self::record_failure(pool, &item, &e, now, &mut report)?;
                    }
                }
            }
        }

        Ok(report)
    }

    fn record_failure(
        pool: &DbPool,
        item: &QueuedEffect,
        err: &crate::errors::AppError,
        now: DateTime<Utc>,
        report: &mut DrainReport,
    ) -> AppResult<()> {
        let attempts = item.attempts + 1;
        let kind = item.kind.to_db_str();

        if item.priority == EffectPriority::Normal && attempts >= MAX_NORMAL_ATTEMPTS {
            queue::mark_dead(&pool.conn, item.id, attempts, &err.to_string(), now)?;
            oplog(
                &pool.conn,
                "effect_dead",
                kind,
                &format!("#{} dead after {} attempts: {}", item.id, attempts, err),
            )?;
            report.dead += 1;
            return Ok(());
        }

        let run_after = now + Duration::minutes(backoff_minutes(attempts, err.is_offline()));
        queue::record_retry(&pool.conn, item.id, attempts, run_after, &err.to_string(), now)?;
        oplog(
            &pool.conn,
            "effect_retry",
            kind,
            &format!("#{} attempt {} failed: {}", item.id, attempts, err),
        )?;
        report.retried += 1;
        Ok(())
    }

    fn execute(
        pool: &mut DbPool,
        cfg: &Config,
        env: &AppEnv,
        item: &QueuedEffect,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        match item.decode()? {
            EffectRequest::SwitchMode(mode) => env.platform.set_mode(mode),
            EffectRequest::RebuildDaySummary(scope) => {
                let date = parse_date(&scope.date)?;
                SummaryLogic::rebuild_day(&pool.conn, &scope.user_id, date, now)?;
                Ok(())
            }
            EffectRequest::StartSessionGuard(g) => {
                guard::start_guard(&pool.conn, &g.session_id, g.started_at, now)
            }
            EffectRequest::CancelSessionGuard { session_id } => {
                guard::cancel_guard(&pool.conn, &session_id)
            }
            EffectRequest::SyncNow => {
                SyncEngine::run(pool, cfg, now)?;
                Ok(())
            }
            EffectRequest::AiCleanup(scope) => {
                let date = parse_date(&scope.date)?;
                AiLogic::run_cleanup(pool, cfg, &scope.user_id, date, now)?;
                Ok(())
            }
            // No long-lived UI in a CLI process; the next status/list call
            // re-reads the database anyway.
            EffectRequest::UiRefresh => Ok(()),
            EffectRequest::Notify(n) => env.notifier.notify(&n.title, &n.body),
            EffectRequest::SyncFences => {
                let fences = locations::list_active(&pool.conn, &cfg.user_id)?;
                env.platform.register_fences(&fences)
            }
            EffectRequest::FenceSettleProbe { fence_id } => {
                RecoveryLogic::settle_probe(pool, cfg, env, &fence_id, now)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::initialize::init_db;
    use crate::models::effect::{EffectStatus, Notification};
    use chrono::TimeZone;
    use rusqlite::params;
    use std::sync::PoisonError;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn setup() -> DbPool {
        let pool = DbPool::new(":memory:").unwrap();
        init_db(&pool.conn).unwrap();
        pool
    }

    fn insert_raw(pool: &DbPool, kind: &str, payload: &str, priority: &str) -> i64 {
        pool.conn
            .execute(
                "INSERT INTO effects_queue
                 (kind, payload, status, attempts, priority, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?4)",
                params![kind, payload, priority, crate::db::db_utils::ts(t0())],
            )
            .unwrap();
        pool.conn.last_insert_rowid()
    }

    fn row_state(pool: &DbPool, id: i64) -> (String, i64) {
        pool.conn
            .query_row(
                "SELECT status, attempts FROM effects_queue WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap()
    }

    #[test]
    fn ladder_follows_attempts_and_caps() {
        assert_eq!(backoff_minutes(1, false), 1);
        assert_eq!(backoff_minutes(2, false), 5);
        assert_eq!(backoff_minutes(3, false), 15);
        assert_eq!(backoff_minutes(4, false), 60);
        assert_eq!(backoff_minutes(9, false), 60);
    }

    #[test]
    fn offline_failures_stay_on_the_first_rung() {
        assert_eq!(backoff_minutes(1, true), 1);
        assert_eq!(backoff_minutes(5, true), 1);
    }

    #[test]
    fn drain_executes_cheap_effects() {
        let _lock = DRAIN_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pool = setup();
        let cfg = Config::default();
        let env = AppEnv::cli(None);

        queue::enqueue(&pool.conn, &EffectRequest::UiRefresh, t0()).unwrap();
        queue::enqueue(
            &pool.conn,
            &EffectRequest::Notify(Notification {
                title: "hi".into(),
                body: "there".into(),
            }),
            t0(),
        )
        .unwrap();

        let report = EffectsLogic::drain(&mut pool, &cfg, &env, t0()).unwrap();
        assert_eq!(report.executed, 2);
        assert_eq!(report.retried, 0);
        assert_eq!(queue::pending_count(&pool.conn).unwrap(), 0);
    }

    #[test]
    fn normal_effect_dead_letters_after_three_attempts() {
        let _lock = DRAIN_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pool = setup();
        let cfg = Config::default();
        let env = AppEnv::cli(None);

        // Undecodable payload: every attempt fails the same way.
        let id = insert_raw(&pool, "notify", "{}", "normal");

        EffectsLogic::drain(&mut pool, &cfg, &env, t0()).unwrap();
        assert_eq!(row_state(&pool, id), ("pending".into(), 1));

        EffectsLogic::drain(&mut pool, &cfg, &env, t0() + Duration::minutes(2)).unwrap();
        assert_eq!(row_state(&pool, id), ("pending".into(), 2));

        let report =
            EffectsLogic::drain(&mut pool, &cfg, &env, t0() + Duration::minutes(10)).unwrap();
        assert_eq!(report.dead, 1);
        assert_eq!(row_state(&pool, id), ("failed".into(), 3));
    }

    #[test]
    fn critical_effect_never_dead_letters() {
        let _lock = DRAIN_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pool = setup();
        let cfg = Config::default();
        let env = AppEnv::cli(None);

        let id = insert_raw(&pool, "rebuild_day_summary", "{}", "critical");

        EffectsLogic::drain(&mut pool, &cfg, &env, t0()).unwrap();
        EffectsLogic::drain(&mut pool, &cfg, &env, t0() + Duration::minutes(2)).unwrap();
        EffectsLogic::drain(&mut pool, &cfg, &env, t0() + Duration::minutes(10)).unwrap();

        let (status, attempts) = row_state(&pool, id);
        assert_eq!(status, EffectStatus::Pending.to_db_str());
        assert_eq!(attempts, 3);
    }

    #[test]
    fn retry_is_not_due_before_its_backoff() {
        let _lock = DRAIN_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pool = setup();
        let cfg = Config::default();
        let env = AppEnv::cli(None);

        insert_raw(&pool, "notify", "{}", "normal");

        EffectsLogic::drain(&mut pool, &cfg, &env, t0()).unwrap();
        // 30 seconds later the 1-minute rung has not elapsed yet.
        let report =
            EffectsLogic::drain(&mut pool, &cfg, &env, t0() + Duration::seconds(30)).unwrap();
        assert_eq!(report.executed + report.retried + report.dead, 0);
    }
}
