//! The tracking state machine: the single authority that turns normalized
//! geofence signals into session boundaries.
//!
//! The decision step is a pure function of (cursor, event) so it can be
//! tested without a database; applying a decision happens inside an
//! EXCLUSIVE transaction that re-checks the open-session invariant before
//! inserting, which is what makes duplicate ENTER delivery idempotent
//! rather than a race. The engine never runs side effects inline — every
//! transition ends by enqueuing.

use crate::config::Config;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::{locations, queue, sessions, tracking};
use crate::errors::AppResult;
use crate::models::effect::{EffectRequest, GuardStart, SummaryScope};
use crate::models::event::{FenceAction, GeofenceEvent};
use crate::models::session::WorkSession;
use crate::models::tracking::{ActiveTracking, TrackingMode, TrackingStatus};
use crate::utils::time::format_ts;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

/// Debounce window between a detected exit and actually closing the
/// session, absorbing GPS flapping at the fence boundary.
pub const EXIT_COOLDOWN_SECS: i64 = 30;

/// What the pure decision step concluded for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// IDLE + enter: open (or reconcile with) a session.
    Open,
    /// IDLE + exit: stray signal, guarded ignore.
    IgnoredExitWhileIdle,
    /// TRACKING + enter on the tracked fence: deduplicated no-op.
    DuplicateEnter,
    /// TRACKING + exit on the tracked fence: arm the cooldown.
    StartCooldown,
    /// TRACKING/EXIT_PENDING + exit on some other fence: stale, ignored.
    StaleExitOtherFence,
    /// TRACKING + enter on a different fence: implicit exit, then re-enter.
    SwitchFence,
    /// EXIT_PENDING + enter on the pending fence: the exit was flapping.
    CancelPendingExit,
    /// EXIT_PENDING + another exit: restart the cooldown timer.
    ResetCooldown,
    /// EXIT_PENDING + enter on a different fence: confirm, then re-enter.
    ConfirmThenEnter,
}

/// Result of one engine call, for CLI messaging.
#[derive(Debug)]
pub struct EngineOutcome {
    pub decision: Decision,
    pub session_id: Option<String>,
}

/// Pure decision step. No I/O, no clock.
pub fn decide(cursor: &ActiveTracking, ev: &GeofenceEvent) -> Decision {
    let same_fence = cursor.fence_id.as_deref() == Some(ev.fence_id.as_str());

    match (cursor.status, ev.action) {
        (TrackingStatus::Idle, FenceAction::Enter) => Decision::Open,
        (TrackingStatus::Idle, FenceAction::Exit) => Decision::IgnoredExitWhileIdle,

        (TrackingStatus::Tracking, FenceAction::Enter) if same_fence => Decision::DuplicateEnter,
        (TrackingStatus::Tracking, FenceAction::Enter) => Decision::SwitchFence,
        (TrackingStatus::Tracking, FenceAction::Exit) if same_fence => Decision::StartCooldown,
        (TrackingStatus::Tracking, FenceAction::Exit) => Decision::StaleExitOtherFence,

        (TrackingStatus::ExitPending, FenceAction::Enter) if same_fence => {
            Decision::CancelPendingExit
        }
        (TrackingStatus::ExitPending, FenceAction::Enter) => Decision::ConfirmThenEnter,
        // Any further exit while pending just restarts the debounce window.
        (TrackingStatus::ExitPending, FenceAction::Exit) => Decision::ResetCooldown,
    }
}

pub struct EngineLogic;

impl EngineLogic {
    /// Process one normalized geofence event end to end.
    pub fn handle_event(
        pool: &mut DbPool,
        cfg: &Config,
        ev: &GeofenceEvent,
        now: DateTime<Utc>,
    ) -> AppResult<EngineOutcome> {
        let tx = pool.tx()?;

        // 1) Lazy cooldown expiry: engine calls are one of the places an
        //    elapsed cooldown gets noticed.
        Self::check_cooldown(&tx, now)?;

        // 2) Decide on current state.
        let cursor = tracking::load_cursor(&tx)?;
        let decision = decide(&cursor, ev);

        // 3) Apply.
        let session_id = match decision {
            Decision::Open => Self::apply_open(&tx, cfg, ev, now)?,
            Decision::IgnoredExitWhileIdle => {
                oplog(
                    &tx,
                    "ignored",
                    &ev.fence_id,
                    "exit signal while IDLE (stray)",
                )?;
                None
            }
            Decision::DuplicateEnter => {
                oplog(&tx, "ignored", &ev.fence_id, "duplicate enter (already tracking)")?;
                cursor.session_id.clone()
            }
            Decision::StartCooldown => {
                Self::apply_start_cooldown(&tx, &cursor, ev, now)?;
                cursor.session_id.clone()
            }
            Decision::StaleExitOtherFence => {
                oplog(
                    &tx,
                    "ignored",
                    &ev.fence_id,
                    "exit signal for a fence we are not tracking (stale)",
                )?;
                cursor.session_id.clone()
            }
            Decision::SwitchFence => {
                // Implicit exit at the NEW event's time, then enter from IDLE.
                if let Some(sid) = &cursor.session_id {
                    Self::confirm_exit(
                        &tx,
                        sid,
                        ev.occurred_at,
                        Some(ev.confidence),
                        "fence switch",
                        now,
                    )?;
                }
                Self::apply_open(&tx, cfg, ev, now)?
            }
            Decision::CancelPendingExit => {
                Self::apply_cancel_pending(&tx, &cursor, now)?;
                cursor.session_id.clone()
            }
            Decision::ResetCooldown => {
                Self::apply_start_cooldown(&tx, &cursor, ev, now)?;
                cursor.session_id.clone()
            }
            Decision::ConfirmThenEnter => {
                // The pending exit was real: close at the recorded candidate
                // exit time, not at the new event's time.
                if let (Some(sid), Some(pending_at)) =
                    (&cursor.session_id, cursor.pending_exit_at)
                {
                    Self::confirm_exit(
                        &tx,
                        sid,
                        pending_at,
                        None,
                        "cooldown pre-empted by enter on another fence",
                        now,
                    )?;
                }
                Self::apply_open(&tx, cfg, ev, now)?
            }
        };

        tx.commit()?;

        Ok(EngineOutcome {
            decision,
            session_id,
        })
    }

    /// Confirm an elapsed exit cooldown, if any. Called from every engine
    /// entry, every heartbeat and on foreground resume.
    pub fn check_cooldown(conn: &Connection, now: DateTime<Utc>) -> AppResult<bool> {
        let cursor = tracking::load_cursor(conn)?;
        if !cursor.cooldown_expired(now) {
            return Ok(false);
        }

        if let (Some(sid), Some(pending_at)) = (&cursor.session_id, cursor.pending_exit_at) {
            Self::confirm_exit(conn, sid, pending_at, None, "cooldown expired", now)?;
        } else {
            // Pending exit without a session is unreconstructible state.
            tracking::save_cursor(conn, &ActiveTracking::idle(now))?;
            oplog(conn, "recover", "", "cleared EXIT_PENDING cursor with no session")?;
        }
        Ok(true)
    }

    /// The only place a session is ever closed.
    ///
    /// `exit_confidence` None means "use the confidence recorded when the
    /// exit went pending" (cooldown paths). The exit confidence can only
    /// lower the stored session confidence, never raise it.
    pub fn confirm_exit(
        conn: &Connection,
        session_id: &str,
        exit_at: DateTime<Utc>,
        exit_confidence: Option<f64>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let Some(mut session) = sessions::get_session(conn, session_id)? else {
            oplog(conn, "recover", session_id, "exit confirm for missing session")?;
            Self::release_cursor_if_current(conn, session_id, now)?;
            return Ok(());
        };

        // Idempotent re-delivery: closing a closed session is a no-op.
        if session.exit_at.is_some() {
            Self::release_cursor_if_current(conn, session_id, now)?;
            return Ok(());
        }

        // 1) Fold an un-resumed pause into the break total.
        if let Some(pause_start) = session.pause_started_at() {
            let paused = (exit_at - pause_start).num_seconds().max(0);
            session.break_secs += paused;
            session.set_pause_started_at(None);
        }

        // 2) Close: net duration, bounded confidence.
        let exit_conf = exit_confidence
            .or_else(|| session.pending_exit_confidence())
            .unwrap_or(1.0);
        session.set_pending_exit_confidence(None);
        session.confidence = session.confidence.min(exit_conf);
        session.duration_min = Some(session.net_minutes(exit_at));
        session.exit_at = Some(exit_at);
        session.synced = false;
        session.updated_at = now;
        sessions::update_session(conn, &session)?;

        // 3) Clear the cursor.
        tracking::save_cursor(conn, &ActiveTracking::idle(now))?;

        // 4) Side effects happen later, through the queue.
        let day = SummaryScope {
            user_id: session.user_id.clone(),
            date: session.day_key(),
        };
        queue::enqueue(conn, &EffectRequest::SwitchMode(TrackingMode::Idle), now)?;
        queue::enqueue(
            conn,
            &EffectRequest::CancelSessionGuard {
                session_id: session.id.clone(),
            },
            now,
        )?;
        queue::enqueue(conn, &EffectRequest::RebuildDaySummary(day.clone()), now)?;
        queue::enqueue(conn, &EffectRequest::SyncNow, now)?;
        queue::enqueue(conn, &EffectRequest::AiCleanup(day), now)?;
        queue::enqueue(conn, &EffectRequest::UiRefresh, now)?;

        oplog(
            conn,
            "exit",
            &session.id,
            &format!(
                "closed at {} ({} min net): {}",
                format_ts(exit_at),
                session.duration_min.unwrap_or(0),
                reason
            ),
        )?;

        Ok(())
    }

    /// IDLE + enter: open a session, with the invariant re-check that makes
    /// duplicate delivery (foreground + headless) idempotent.
    fn apply_open(
        conn: &Connection,
        cfg: &Config,
        ev: &GeofenceEvent,
        now: DateTime<Utc>,
    ) -> AppResult<Option<String>> {
        // Re-check under the exclusive transaction: a concurrent entry point
        // may have opened the session already.
        if let Some(open) = sessions::find_open_session(conn, &cfg.user_id)? {
            let same_fence = open.location_id.as_deref() == Some(ev.fence_id.as_str());
            if same_fence {
                oplog(
                    conn,
                    "enter",
                    &open.id,
                    "enter matched an existing open session (reused)",
                )?;
            } else {
                // Bug guard: never create a second open row. Keep the
                // existing session and re-point the cursor at it.
                oplog(
                    conn,
                    "ignored",
                    &ev.fence_id,
                    &format!(
                        "enter while session {} is open on another fence (kept existing)",
                        open.id
                    ),
                )?;
            }
            Self::rehydrate_cursor(conn, &open, now)?;
            Self::enqueue_enter_effects(conn, &open, now)?;
            return Ok(Some(open.id));
        }

        // Resolve the fence for its display name; unknown ids still open a
        // session (the fence may arrive via sync later).
        let fence = locations::get_location(conn, &ev.fence_id)?;
        let fence_name = fence.as_ref().map(|f| f.name.clone());

        let session = WorkSession::open(
            &cfg.user_id,
            Some(ev.fence_id.clone()),
            fence_name.clone(),
            ev.occurred_at,
            ev.source,
            ev.confidence,
            now,
        );
        sessions::insert_session(conn, &session)?;

        let cursor = ActiveTracking {
            status: TrackingStatus::Tracking,
            session_id: Some(session.id.clone()),
            fence_id: Some(ev.fence_id.clone()),
            fence_name,
            entered_at: Some(ev.occurred_at),
            pending_exit_at: None,
            cooldown_until: None,
            pause_secs: 0,
            outside_count: 0,
            updated_at: now,
        };
        tracking::save_cursor(conn, &cursor)?;

        Self::enqueue_enter_effects(conn, &session, now)?;

        oplog(
            conn,
            "enter",
            &session.id,
            &format!(
                "opened at {} (fence {}, source {}, delay {}s)",
                format_ts(ev.occurred_at),
                ev.fence_id,
                ev.source.to_db_str(),
                ev.delay_secs()
            ),
        )?;

        Ok(Some(session.id))
    }

    pub(crate) fn enqueue_enter_effects(
        conn: &Connection,
        session: &WorkSession,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        queue::enqueue(conn, &EffectRequest::SwitchMode(TrackingMode::Active), now)?;
        queue::enqueue(
            conn,
            &EffectRequest::RebuildDaySummary(SummaryScope {
                user_id: session.user_id.clone(),
                date: session.day_key(),
            }),
            now,
        )?;
        queue::enqueue(
            conn,
            &EffectRequest::StartSessionGuard(GuardStart {
                session_id: session.id.clone(),
                started_at: session.enter_at,
            }),
            now,
        )?;
        queue::enqueue(conn, &EffectRequest::UiRefresh, now)?;
        Ok(())
    }

    /// Reset the cursor to IDLE only if it still points at `session_id`.
    /// Late confirms for an old session must not clobber a newer one.
    pub(crate) fn release_cursor_if_current(
        conn: &Connection,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let cursor = tracking::load_cursor(conn)?;
        if cursor.session_id.as_deref() == Some(session_id) {
            tracking::save_cursor(conn, &ActiveTracking::idle(now))?;
        }
        Ok(())
    }

    /// Rebuild the cursor from an open session row (duplicate enter, boot
    /// recovery). Creates nothing.
    pub fn rehydrate_cursor(
        conn: &Connection,
        session: &WorkSession,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let cursor = ActiveTracking {
            status: TrackingStatus::Tracking,
            session_id: Some(session.id.clone()),
            fence_id: session.location_id.clone(),
            fence_name: session.location_name.clone(),
            entered_at: Some(session.enter_at),
            pending_exit_at: None,
            cooldown_until: None,
            pause_secs: session.break_secs,
            outside_count: 0,
            updated_at: now,
        };
        tracking::save_cursor(conn, &cursor)?;
        Ok(())
    }

    /// Arm (or restart) the exit cooldown. The session stays open; the
    /// signal's confidence is stashed on the session for the eventual
    /// confirm.
    fn apply_start_cooldown(
        conn: &Connection,
        cursor: &ActiveTracking,
        ev: &GeofenceEvent,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut next = cursor.clone();
        next.status = TrackingStatus::ExitPending;
        next.pending_exit_at = Some(ev.occurred_at);
        next.cooldown_until = Some(ev.occurred_at + Duration::seconds(EXIT_COOLDOWN_SECS));
        next.updated_at = now;
        tracking::save_cursor(conn, &next)?;

        if let Some(sid) = &cursor.session_id
            && let Some(mut session) = sessions::get_session(conn, sid)?
        {
            session.set_pending_exit_confidence(Some(ev.confidence));
            session.synced = false;
            session.updated_at = now;
            sessions::update_session(conn, &session)?;
        }

        oplog(
            conn,
            "exit_pending",
            cursor.session_id.as_deref().unwrap_or(""),
            &format!(
                "exit candidate at {}, cooldown until {}",
                format_ts(ev.occurred_at),
                format_ts(ev.occurred_at + Duration::seconds(EXIT_COOLDOWN_SECS))
            ),
        )?;
        Ok(())
    }

    /// The worker came back inside the cooldown window: the exit was
    /// boundary flapping. Same session, same row.
    fn apply_cancel_pending(
        conn: &Connection,
        cursor: &ActiveTracking,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut next = cursor.clone();
        next.status = TrackingStatus::Tracking;
        next.pending_exit_at = None;
        next.cooldown_until = None;
        next.updated_at = now;
        tracking::save_cursor(conn, &next)?;

        if let Some(sid) = &cursor.session_id
            && let Some(mut session) = sessions::get_session(conn, sid)?
        {
            session.set_pending_exit_confidence(None);
            session.synced = false;
            session.updated_at = now;
            sessions::update_session(conn, &session)?;
        }

        oplog(
            conn,
            "exit_cancelled",
            cursor.session_id.as_deref().unwrap_or(""),
            "re-entered during cooldown, exit discarded",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::SessionSource;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn ev(action: FenceAction, fence: &str) -> GeofenceEvent {
        GeofenceEvent {
            action,
            fence_id: fence.to_string(),
            occurred_at: t0(),
            received_at: t0(),
            source: SessionSource::Gps,
            confidence: 1.0,
            fix: None,
        }
    }

    fn tracking_cursor(fence: &str) -> ActiveTracking {
        let mut c = ActiveTracking::idle(t0());
        c.status = TrackingStatus::Tracking;
        c.session_id = Some("s1".to_string());
        c.fence_id = Some(fence.to_string());
        c
    }

    fn pending_cursor(fence: &str) -> ActiveTracking {
        let mut c = tracking_cursor(fence);
        c.status = TrackingStatus::ExitPending;
        c.pending_exit_at = Some(t0());
        c.cooldown_until = Some(t0() + Duration::seconds(EXIT_COOLDOWN_SECS));
        c
    }

    #[test]
    fn idle_enter_opens() {
        let c = ActiveTracking::idle(t0());
        assert_eq!(decide(&c, &ev(FenceAction::Enter, "f1")), Decision::Open);
    }

    #[test]
    fn idle_exit_is_ignored() {
        let c = ActiveTracking::idle(t0());
        assert_eq!(
            decide(&c, &ev(FenceAction::Exit, "f1")),
            Decision::IgnoredExitWhileIdle
        );
    }

    #[test]
    fn tracking_enter_same_fence_is_duplicate() {
        let c = tracking_cursor("f1");
        assert_eq!(
            decide(&c, &ev(FenceAction::Enter, "f1")),
            Decision::DuplicateEnter
        );
    }

    #[test]
    fn tracking_enter_other_fence_switches() {
        let c = tracking_cursor("f1");
        assert_eq!(
            decide(&c, &ev(FenceAction::Enter, "f2")),
            Decision::SwitchFence
        );
    }

    #[test]
    fn tracking_exit_same_fence_starts_cooldown() {
        let c = tracking_cursor("f1");
        assert_eq!(
            decide(&c, &ev(FenceAction::Exit, "f1")),
            Decision::StartCooldown
        );
    }

    #[test]
    fn tracking_exit_other_fence_is_stale() {
        let c = tracking_cursor("f1");
        assert_eq!(
            decide(&c, &ev(FenceAction::Exit, "f2")),
            Decision::StaleExitOtherFence
        );
    }

    #[test]
    fn pending_enter_same_fence_cancels() {
        let c = pending_cursor("f1");
        assert_eq!(
            decide(&c, &ev(FenceAction::Enter, "f1")),
            Decision::CancelPendingExit
        );
    }

    #[test]
    fn pending_enter_other_fence_confirms_then_enters() {
        let c = pending_cursor("f1");
        assert_eq!(
            decide(&c, &ev(FenceAction::Enter, "f2")),
            Decision::ConfirmThenEnter
        );
    }

    #[test]
    fn pending_exit_resets_cooldown_for_any_fence() {
        let c = pending_cursor("f1");
        assert_eq!(
            decide(&c, &ev(FenceAction::Exit, "f1")),
            Decision::ResetCooldown
        );
        assert_eq!(
            decide(&c, &ev(FenceAction::Exit, "f2")),
            Decision::ResetCooldown
        );
    }

    #[test]
    fn fenceless_session_treats_fence_events_as_other_fence() {
        // A voice-started session has no fence on the cursor: an enter
        // switches to the fence, an exit is stale noise.
        let mut c = tracking_cursor("f1");
        c.fence_id = None;
        assert_eq!(
            decide(&c, &ev(FenceAction::Enter, "f1")),
            Decision::SwitchFence
        );
        assert_eq!(
            decide(&c, &ev(FenceAction::Exit, "f1")),
            Decision::StaleExitOtherFence
        );
    }
}
