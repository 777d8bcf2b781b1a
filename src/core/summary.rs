//! Day summary builder.
//!
//! Summaries are a derived cache: every rebuild recomputes the whole day
//! from its session rows and overwrites the stored aggregate. The build
//! step is a pure function of its inputs, so two rebuilds over the same
//! rows produce byte-identical JSON (BTreeMap keeps the source mix
//! ordered).

use crate::db::{corrections, sessions, summaries};
use crate::errors::AppResult;
use crate::models::day_summary::{flags, DaySummary};
use crate::models::session::WorkSession;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::Connection;
use std::collections::BTreeMap;
use uuid::Uuid;

/// More than 10 h net in a day.
const OVERTIME_MIN: i64 = 600;

/// `no_break` fires at 6+ h worked with under half an hour of breaks.
const NO_BREAK_WORKED_MIN: i64 = 360;
const NO_BREAK_LIMIT_MIN: i64 = 30;

/// `early_departure`: done for the day before 15:00 UTC with under 8 h.
const EARLY_DEPARTURE_CUTOFF_HOUR: u32 = 15;
const EARLY_DEPARTURE_MIN: i64 = 480;

pub struct SummaryLogic;

impl SummaryLogic {
    /// Recompute and store the aggregate for one user/day.
    pub fn rebuild_day(
        conn: &Connection,
        user_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<DaySummary> {
        let day_sessions = sessions::load_sessions_for_day(conn, user_id, date)?;

        let mut ai_corrected = false;
        for s in &day_sessions {
            if corrections::list_for_session(conn, &s.id)?
                .iter()
                .any(|c| !c.reverted && !c.deleted)
            {
                ai_corrected = true;
                break;
            }
        }

        // Keep the row id stable across rebuilds so the remote sees an
        // update, not a new row.
        let existing_id = summaries::get_summary(conn, user_id, date)?.map(|s| s.id);

        let summary = build_summary(user_id, date, &day_sessions, ai_corrected, existing_id, now);
        summaries::upsert_summary(conn, &summary)?;
        Ok(summary)
    }
}

/// Pure aggregation. Absence markers contribute only their flag; open
/// sessions count toward presence (first_enter, session_count) but add no
/// minutes until they close.
pub fn build_summary(
    user_id: &str,
    date: NaiveDate,
    day_sessions: &[WorkSession],
    ai_corrected: bool,
    existing_id: Option<String>,
    now: DateTime<Utc>,
) -> DaySummary {
    let (markers, work): (Vec<&WorkSession>, Vec<&WorkSession>) =
        day_sessions.iter().partition(|s| s.day_type().is_some());

    let total_min: i64 = work.iter().filter_map(|s| s.duration_min).sum();
    let break_min: i64 = work.iter().map(|s| s.break_secs).sum::<i64>() / 60;
    let first_enter = work.iter().map(|s| s.enter_at).min();
    let last_exit = work.iter().filter_map(|s| s.exit_at).max();
    let open_count = work.iter().filter(|s| s.is_open()).count();

    // Minutes per location and per source, closed sessions only.
    let mut by_location: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_source: BTreeMap<String, i64> = BTreeMap::new();
    for s in &work {
        let Some(mins) = s.duration_min else { continue };
        if let Some(key) = s.location_name.clone().or_else(|| s.location_id.clone()) {
            *by_location.entry(key).or_insert(0) += mins;
        }
        *by_source.entry(s.source.to_db_str().to_string()).or_insert(0) += mins;
    }

    // BTreeMap iteration is ordered, so an equal-minutes tie lands on the
    // lexicographically smallest name.
    let primary_location = by_location
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(name, _)| name.clone());

    let source_mix: BTreeMap<String, f64> = if total_min > 0 {
        by_source
            .into_iter()
            .map(|(src, mins)| (src, mins as f64 / total_min as f64))
            .collect()
    } else {
        BTreeMap::new()
    };

    let mut flag_list = Vec::new();
    if total_min > OVERTIME_MIN {
        flag_list.push(flags::OVERTIME.to_string());
    }
    if total_min >= NO_BREAK_WORKED_MIN && break_min < NO_BREAK_LIMIT_MIN {
        flag_list.push(flags::NO_BREAK.to_string());
    }
    if let Some(exit) = last_exit {
        let cutoff = NaiveTime::from_hms_opt(EARLY_DEPARTURE_CUTOFF_HOUR, 0, 0)
            .unwrap_or(NaiveTime::MIN);
        if open_count == 0 && exit.time() < cutoff && total_min < EARLY_DEPARTURE_MIN {
            flag_list.push(flags::EARLY_DEPARTURE.to_string());
        }
    }
    if ai_corrected {
        flag_list.push(flags::AI_CORRECTED.to_string());
    }
    let mut absences: Vec<String> = markers
        .iter()
        .filter_map(|s| s.day_type())
        .map(|kind| format!("{}{}", flags::ABSENCE_PREFIX, kind))
        .collect();
    absences.sort();
    absences.dedup();
    flag_list.extend(absences);

    DaySummary {
        id: existing_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        user_id: user_id.to_string(),
        date: date.format("%Y-%m-%d").to_string(),
        total_min,
        break_min,
        first_enter,
        last_exit,
        session_count: work.len() as i64,
        primary_location,
        source_mix,
        flags: flag_list,
        deleted: false,
        synced: false,
        synced_at: None,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::SessionSource;
    use chrono::{Duration, TimeZone};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn closed(
        name: &str,
        enter: DateTime<Utc>,
        mins: i64,
        break_secs: i64,
        source: SessionSource,
    ) -> WorkSession {
        let mut s = WorkSession::open(
            "u1",
            Some(format!("loc-{name}")),
            Some(name.to_string()),
            enter,
            source,
            1.0,
            enter,
        );
        s.break_secs = break_secs;
        s.exit_at = Some(enter + Duration::minutes(mins) + Duration::seconds(break_secs));
        s.duration_min = Some(mins);
        s
    }

    fn marker(kind: &str) -> WorkSession {
        let mut s = WorkSession::open("u1", None, None, at(0, 0), SessionSource::Manual, 1.0, at(0, 0));
        s.exit_at = Some(at(0, 0));
        s.duration_min = Some(0);
        s.set_day_type(kind);
        s
    }

    #[test]
    fn aggregates_a_plain_day() {
        let rows = vec![
            closed("Depot", at(8, 0), 240, 1800, SessionSource::Gps),
            closed("Office", at(13, 0), 120, 0, SessionSource::Manual),
        ];
        let s = build_summary("u1", day(), &rows, false, None, at(20, 0));

        assert_eq!(s.total_min, 360);
        assert_eq!(s.break_min, 30);
        assert_eq!(s.first_enter, Some(at(8, 0)));
        assert_eq!(s.last_exit, rows[1].exit_at);
        assert_eq!(s.session_count, 2);
        assert_eq!(s.primary_location.as_deref(), Some("Depot"));
        assert!((s.source_mix["gps"] - 240.0 / 360.0).abs() < 1e-9);
        assert!((s.source_mix["manual"] - 120.0 / 360.0).abs() < 1e-9);
        assert!(s.flags.is_empty());
    }

    #[test]
    fn overtime_fires_past_ten_hours() {
        let under = vec![closed("Depot", at(6, 0), 600, 0, SessionSource::Gps)];
        let over = vec![closed("Depot", at(6, 0), 601, 0, SessionSource::Gps)];

        assert!(!build_summary("u1", day(), &under, false, None, at(20, 0))
            .has_flag(flags::OVERTIME));
        assert!(build_summary("u1", day(), &over, false, None, at(20, 0))
            .has_flag(flags::OVERTIME));
    }

    #[test]
    fn no_break_needs_six_hours_and_a_short_break() {
        let skipped = vec![closed("Depot", at(8, 0), 400, 600, SessionSource::Gps)];
        let rested = vec![closed("Depot", at(8, 0), 400, 2700, SessionSource::Gps)];
        let short_day = vec![closed("Depot", at(8, 0), 200, 0, SessionSource::Gps)];

        assert!(build_summary("u1", day(), &skipped, false, None, at(20, 0))
            .has_flag(flags::NO_BREAK));
        assert!(!build_summary("u1", day(), &rested, false, None, at(20, 0))
            .has_flag(flags::NO_BREAK));
        assert!(!build_summary("u1", day(), &short_day, false, None, at(20, 0))
            .has_flag(flags::NO_BREAK));
    }

    #[test]
    fn early_departure_only_when_nothing_is_still_open() {
        let gone_early = vec![closed("Depot", at(8, 0), 300, 0, SessionSource::Gps)];
        let s = build_summary("u1", day(), &gone_early, false, None, at(20, 0));
        assert!(s.has_flag(flags::EARLY_DEPARTURE));

        // Came back: an open session means the day is not over.
        let mut back = gone_early.clone();
        back.push(WorkSession::open(
            "u1",
            Some("loc-Depot".into()),
            Some("Depot".into()),
            at(14, 30),
            SessionSource::Gps,
            1.0,
            at(14, 30),
        ));
        let s = build_summary("u1", day(), &back, false, None, at(20, 0));
        assert!(!s.has_flag(flags::EARLY_DEPARTURE));

        // Left late with a short total: not an early departure either.
        let late = vec![closed("Depot", at(13, 0), 300, 0, SessionSource::Gps)];
        let s = build_summary("u1", day(), &late, false, None, at(20, 0));
        assert!(!s.has_flag(flags::EARLY_DEPARTURE));
    }

    #[test]
    fn absence_marker_adds_flag_without_skewing_times() {
        let rows = vec![marker("sick"), closed("Depot", at(10, 0), 120, 0, SessionSource::Gps)];
        let s = build_summary("u1", day(), &rows, false, None, at(20, 0));

        assert!(s.has_flag("absence:sick"));
        assert_eq!(s.first_enter, Some(at(10, 0)));
        assert_eq!(s.session_count, 1);
        assert_eq!(s.total_min, 120);
    }

    #[test]
    fn primary_location_tie_breaks_lexicographically() {
        let rows = vec![
            closed("Beta", at(8, 0), 120, 0, SessionSource::Gps),
            closed("Alpha", at(11, 0), 120, 0, SessionSource::Gps),
        ];
        let s = build_summary("u1", day(), &rows, false, None, at(20, 0));
        assert_eq!(s.primary_location.as_deref(), Some("Alpha"));
    }

    #[test]
    fn rebuild_is_byte_identical_for_identical_input() {
        let rows = vec![
            closed("Depot", at(8, 0), 240, 1800, SessionSource::Gps),
            closed("Office", at(13, 0), 121, 0, SessionSource::Voice),
        ];
        let a = build_summary("u1", day(), &rows, true, Some("fixed-id".into()), at(20, 0));
        let b = build_summary("u1", day(), &rows, true, Some("fixed-id".into()), at(20, 0));

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert_eq!(a.source_mix_json(), b.source_mix_json());
        assert_eq!(a.flags_json(), b.flags_json());
    }
}
