//! AI collaborators: the nightly "secretary" that tidies a day's sessions
//! and the voice interpreter that turns a transcript into one action.
//!
//! Both sit behind traits so the rest of the app never sees HTTP. Their
//! output is untrusted input: every suggestion is re-validated here and
//! applied through the normal edit path, which is where the source ranking
//! and the audit trail live. A failing suggestion is collected, never
//! fatal.

use crate::config::Config;
use crate::core::summary::SummaryLogic;
use crate::core::usecases::{self, SessionEdit, UseCaseLogic};
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::{corrections, locations, sessions, summaries, tracking};
use crate::errors::{AppError, AppResult};
use crate::models::correction::AiCorrection;
use crate::models::effect::{EffectRequest, Notification};
use crate::models::session::WorkSession;
use crate::models::source::SessionSource;
use crate::utils::time::format_minutes;
use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration as StdDuration;

const AI_HTTP_TIMEOUT_SECS: u64 = 20;

/// One proposed change to one session, as returned by the secretary
/// endpoint. `from` is advisory; the applied correction records the value
/// actually found on the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedCorrection {
    pub session_id: String,
    pub field: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    pub reason: String,
}

/// Rolling picture of the worker's habits, sent along so the secretary can
/// spot outliers ("usually leaves around 17:20").
#[derive(Debug, Clone, Serialize)]
pub struct WorkerProfile {
    pub days_counted: i64,
    pub median_start_min: Option<i64>,
    pub median_end_min: Option<i64>,
    pub median_total_min: Option<i64>,
    pub median_break_min: Option<i64>,
}

impl WorkerProfile {
    /// Medians over the last 30 days of summaries (absence days excluded).
    pub fn compute(
        conn: &rusqlite::Connection,
        user_id: &str,
        today: NaiveDate,
    ) -> AppResult<WorkerProfile> {
        let start = today.checked_sub_days(Days::new(30)).unwrap_or(today);
        let rows = summaries::list_between(conn, user_id, start, today)?;

        let mut starts = Vec::new();
        let mut ends = Vec::new();
        let mut totals = Vec::new();
        let mut breaks = Vec::new();
        for s in &rows {
            if s.total_min == 0 {
                continue;
            }
            if let Some(first) = s.first_enter {
                starts.push((first.hour() * 60 + first.minute()) as i64);
            }
            if let Some(last) = s.last_exit {
                ends.push((last.hour() * 60 + last.minute()) as i64);
            }
            totals.push(s.total_min);
            breaks.push(s.break_min);
        }

        Ok(WorkerProfile {
            days_counted: totals.len() as i64,
            median_start_min: median(&mut starts),
            median_end_min: median(&mut ends),
            median_total_min: median(&mut totals),
            median_break_min: median(&mut breaks),
        })
    }
}

fn median(values: &mut Vec<i64>) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    Some(values[values.len() / 2])
}

/// What the voice interpreter decided the transcript means. Tagged on the
/// wire by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VoiceAction {
    UpdateRecord {
        session_id: String,
        field: String,
        #[serde(default)]
        value: Option<String>,
    },
    DeleteRecord {
        session_id: String,
    },
    Start {
        #[serde(default)]
        fence: Option<String>,
    },
    Stop,
    Pause,
    Resume,
    Query {
        #[serde(default)]
        date: Option<String>,
    },
    CreateLocation {
        name: String,
        lat: f64,
        lng: f64,
        radius_m: f64,
    },
    DeleteLocation {
        name: String,
    },
    MarkDayType {
        date: String,
        kind: String,
    },
    SendReport {
        #[serde(default)]
        date: Option<String>,
    },
    Error {
        message: String,
    },
}

/// State snapshot shipped with the transcript so the interpreter can
/// resolve "that last one" and fence names.
#[derive(Debug, Serialize)]
pub struct VoiceContext {
    pub status: String,
    pub open_session_id: Option<String>,
    pub today: String,
    pub fences: Vec<String>,
}

impl VoiceContext {
    pub fn gather(
        conn: &rusqlite::Connection,
        cfg: &Config,
        now: DateTime<Utc>,
    ) -> AppResult<VoiceContext> {
        let cursor = tracking::load_cursor(conn)?;
        let fences = locations::list_active(conn, &cfg.user_id)?
            .into_iter()
            .map(|f| f.name)
            .collect();
        Ok(VoiceContext {
            status: cursor.status.to_db_str().to_string(),
            open_session_id: cursor.session_id,
            today: now.format("%Y-%m-%d").to_string(),
            fences,
        })
    }
}

pub trait SecretaryClient {
    fn clean_day(
        &self,
        user_id: &str,
        date: NaiveDate,
        day_sessions: &[WorkSession],
        profile: &WorkerProfile,
    ) -> AppResult<Vec<SuggestedCorrection>>;
}

pub trait VoiceClient {
    fn interpret(&self, transcript: &str, context: &VoiceContext) -> AppResult<VoiceAction>;
}

/// HTTP client for both AI endpoints.
pub struct HttpAi {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAi {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(StdDuration::from_secs(AI_HTTP_TIMEOUT_SECS))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(|k| k.to_string()),
        }
    }

    /// Built from config when an AI endpoint is set.
    pub fn from_config(cfg: &Config) -> Option<HttpAi> {
        let url = cfg.ai_url.as_deref().filter(|u| !u.is_empty())?;
        Some(HttpAi::new(url, cfg.ai_api_key.as_deref()))
    }

    fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> AppResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.agent.post(&url);
        if let Some(key) = &self.api_key {
            req = req.set("x-api-key", key);
        }
        let resp = req.send_json(body).map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                AppError::Ai(format!("endpoint {path} returned HTTP {code}"))
            }
            ureq::Error::Transport(t) => AppError::Ai(format!("endpoint {path} unreachable: {t}")),
        })?;
        resp.into_json::<T>()
            .map_err(|e| AppError::Ai(format!("endpoint {path} sent malformed JSON: {e}")))
    }
}

#[derive(Serialize)]
struct CleanRequest<'a> {
    user_id: &'a str,
    date: String,
    sessions: &'a [WorkSession],
    profile: &'a WorkerProfile,
}

#[derive(Deserialize)]
struct CleanResponse {
    #[serde(default)]
    suggestions: Vec<SuggestedCorrection>,
}

#[derive(Serialize)]
struct InterpretRequest<'a> {
    transcript: &'a str,
    context: &'a VoiceContext,
}

impl SecretaryClient for HttpAi {
    fn clean_day(
        &self,
        user_id: &str,
        date: NaiveDate,
        day_sessions: &[WorkSession],
        profile: &WorkerProfile,
    ) -> AppResult<Vec<SuggestedCorrection>> {
        let req = CleanRequest {
            user_id,
            date: date.format("%Y-%m-%d").to_string(),
            sessions: day_sessions,
            profile,
        };
        let resp: CleanResponse = self.post("/secretary/clean", &req)?;
        Ok(resp.suggestions)
    }
}

impl VoiceClient for HttpAi {
    fn interpret(&self, transcript: &str, context: &VoiceContext) -> AppResult<VoiceAction> {
        self.post("/voice/interpret", &InterpretRequest { transcript, context })
    }
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub suggested: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
}

/// What a dispatched voice action did, for CLI messaging.
#[derive(Debug)]
pub enum VoiceOutcome {
    Started(WorkSession),
    Stopped(WorkSession),
    Paused,
    Resumed,
    Updated(WorkSession),
    Deleted(String),
    Query(String),
    Report(String),
    LocationCreated(String),
    LocationDeleted(String),
    DayMarked { date: NaiveDate, kind: String },
}

pub struct AiLogic;

impl AiLogic {
    /// Nightly cleanup for one user/day. Unconfigured endpoint is a logged
    /// no-op so the queued effect settles instead of retrying forever.
    pub fn run_cleanup(
        pool: &mut DbPool,
        cfg: &Config,
        user_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<CleanupReport> {
        let Some(client) = HttpAi::from_config(cfg) else {
            oplog(
                &pool.conn,
                "ai",
                &date.format("%Y-%m-%d").to_string(),
                "cleanup skipped: no AI endpoint configured",
            )?;
            return Ok(CleanupReport::default());
        };
        Self::clean_with(&client, pool, user_id, date, now)
    }

    /// Cleanup against an explicit client (tests inject a stub here).
    pub fn clean_with(
        client: &dyn SecretaryClient,
        pool: &mut DbPool,
        user_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<CleanupReport> {
        // Only settled rows: open sessions and absence markers are not the
        // secretary's business.
        let day_sessions: Vec<WorkSession> =
            sessions::load_sessions_for_day(&pool.conn, user_id, date)?
                .into_iter()
                .filter(|s| !s.is_open() && s.day_type().is_none())
                .collect();
        if day_sessions.is_empty() {
            return Ok(CleanupReport::default());
        }

        let profile = WorkerProfile::compute(&pool.conn, user_id, date)?;
        let suggestions = client.clean_day(user_id, date, &day_sessions, &profile)?;

        let day_ids: HashSet<String> = day_sessions.iter().map(|s| s.id.clone()).collect();
        let mut report = CleanupReport {
            suggested: suggestions.len(),
            ..CleanupReport::default()
        };

        for sug in suggestions {
            match Self::apply_suggestion(pool, &day_ids, &sug, now) {
                Ok(true) => report.applied += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => report
                    .failures
                    .push(format!("{} {}: {}", sug.session_id, sug.field, e)),
            }
        }

        oplog(
            &pool.conn,
            "ai",
            &date.format("%Y-%m-%d").to_string(),
            &format!(
                "cleanup: {} suggested, {} applied, {} skipped, {} failed",
                report.suggested,
                report.applied,
                report.skipped,
                report.failures.len()
            ),
        )?;
        Ok(report)
    }

    /// Validate and apply one suggestion. Ok(false) = deliberate skip.
    fn apply_suggestion(
        pool: &mut DbPool,
        day_ids: &HashSet<String>,
        sug: &SuggestedCorrection,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        if !day_ids.contains(&sug.session_id) {
            return Err(AppError::Ai(
                "suggestion targets a session outside the day".to_string(),
            ));
        }

        // Parses the value and rejects unknown fields in one step.
        let edit = usecases::edit_for_field(&sug.field, sug.to.as_deref())?;

        let session = sessions::get_session(&pool.conn, &sug.session_id)?
            .ok_or_else(|| AppError::SessionNotFound(sug.session_id.clone()))?;
        if Self::is_noop(&edit, &session) {
            return Ok(false);
        }

        let original = usecases::field_value(&session, &sug.field)?;
        let corrected = Self::normalized_target(&edit);

        UseCaseLogic::edit_session(pool, &sug.session_id, &edit, SessionSource::Secretary, now)?;

        let correction = AiCorrection::new(
            &sug.session_id,
            &session.user_id,
            &sug.field,
            original,
            corrected,
            &sug.reason,
            now,
        );
        corrections::insert_correction(&pool.conn, &correction)?;
        Ok(true)
    }

    /// Compare the parsed target against the row, not string against
    /// string: the endpoint may format timestamps differently.
    fn is_noop(edit: &SessionEdit, session: &WorkSession) -> bool {
        if let Some(enter) = edit.enter_at {
            return enter == session.enter_at;
        }
        if let Some(exit) = edit.exit_at {
            return Some(exit) == session.exit_at;
        }
        if let Some(break_min) = edit.break_min {
            return break_min == session.break_secs / 60;
        }
        if let Some(notes) = &edit.notes {
            return *notes == session.notes;
        }
        true
    }

    fn normalized_target(edit: &SessionEdit) -> Option<String> {
        if let Some(enter) = edit.enter_at {
            return Some(crate::db::db_utils::ts(enter));
        }
        if let Some(exit) = edit.exit_at {
            return Some(crate::db::db_utils::ts(exit));
        }
        if let Some(break_min) = edit.break_min {
            return Some(break_min.to_string());
        }
        edit.notes.clone()
    }

    /// One transcript in, one dispatched action out.
    pub fn dispatch_voice(
        pool: &mut DbPool,
        cfg: &Config,
        transcript: &str,
        now: DateTime<Utc>,
    ) -> AppResult<VoiceOutcome> {
        let client = HttpAi::from_config(cfg)
            .ok_or_else(|| AppError::Ai("no AI endpoint configured".to_string()))?;
        let context = VoiceContext::gather(&pool.conn, cfg, now)?;
        let action = client.interpret(transcript, &context)?;
        oplog(
            &pool.conn,
            "voice",
            "",
            &format!("transcript interpreted as {}", kind_of(&action)),
        )?;
        Self::apply_voice(pool, cfg, action, now)
    }

    /// The action switch, separated so tests can skip the HTTP client.
    pub fn apply_voice(
        pool: &mut DbPool,
        cfg: &Config,
        action: VoiceAction,
        now: DateTime<Utc>,
    ) -> AppResult<VoiceOutcome> {
        match action {
            VoiceAction::Start { fence } => {
                UseCaseLogic::start_manual(pool, cfg, fence.as_deref(), SessionSource::Voice, now, now)
                    .map(VoiceOutcome::Started)
            }
            VoiceAction::Stop => {
                UseCaseLogic::stop(pool, cfg, now, now).map(VoiceOutcome::Stopped)
            }
            VoiceAction::Pause => {
                UseCaseLogic::pause(pool, cfg, now, now).map(|_| VoiceOutcome::Paused)
            }
            VoiceAction::Resume => {
                UseCaseLogic::resume(pool, cfg, now, now).map(|_| VoiceOutcome::Resumed)
            }
            VoiceAction::UpdateRecord {
                session_id,
                field,
                value,
            } => {
                let edit = usecases::edit_for_field(&field, value.as_deref())?;
                UseCaseLogic::edit_session(pool, &session_id, &edit, SessionSource::Voice, now)
                    .map(VoiceOutcome::Updated)
            }
            VoiceAction::DeleteRecord { session_id } => {
                UseCaseLogic::delete_session(pool, &session_id, now)?;
                Ok(VoiceOutcome::Deleted(session_id))
            }
            VoiceAction::Query { date } => {
                let day = Self::parse_voice_date(date.as_deref(), now)?;
                Ok(VoiceOutcome::Query(Self::describe_day(pool, cfg, day, now)?))
            }
            VoiceAction::CreateLocation {
                name,
                lat,
                lng,
                radius_m,
            } => UseCaseLogic::create_fence(pool, cfg, &name, lat, lng, radius_m, now)
                .map(|f| VoiceOutcome::LocationCreated(f.name)),
            VoiceAction::DeleteLocation { name } => {
                UseCaseLogic::delete_fence(pool, cfg, &name, now)
                    .map(|f| VoiceOutcome::LocationDeleted(f.name))
            }
            VoiceAction::MarkDayType { date, kind } => {
                let day = crate::utils::date::parse_date(&date)?;
                UseCaseLogic::mark_day_type(pool, cfg, day, &kind, now)?;
                Ok(VoiceOutcome::DayMarked { date: day, kind })
            }
            VoiceAction::SendReport { date } => {
                let day = Self::parse_voice_date(date.as_deref(), now)?;
                let text = Self::describe_day(pool, cfg, day, now)?;
                crate::db::queue::enqueue(
                    &pool.conn,
                    &EffectRequest::Notify(Notification {
                        title: format!("Work report {day}"),
                        body: text.clone(),
                    }),
                    now,
                )?;
                Ok(VoiceOutcome::Report(text))
            }
            VoiceAction::Error { message } => Err(AppError::Ai(message)),
        }
    }

    fn parse_voice_date(date: Option<&str>, now: DateTime<Utc>) -> AppResult<NaiveDate> {
        match date {
            Some(s) => crate::utils::date::parse_date(s),
            None => Ok(now.date_naive()),
        }
    }

    fn describe_day(
        pool: &mut DbPool,
        cfg: &Config,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let s = SummaryLogic::rebuild_day(&pool.conn, &cfg.user_id, day, now)?;
        let mut line = format!(
            "{}: {} session(s), {} worked, {} break",
            day,
            s.session_count,
            format_minutes(s.total_min),
            format_minutes(s.break_min)
        );
        if let Some(primary) = &s.primary_location {
            line.push_str(&format!(", mostly at {primary}"));
        }
        if !s.flags.is_empty() {
            line.push_str(&format!(" [{}]", s.flags.join(", ")));
        }
        Ok(line)
    }
}

fn kind_of(action: &VoiceAction) -> &'static str {
    match action {
        VoiceAction::UpdateRecord { .. } => "update_record",
        VoiceAction::DeleteRecord { .. } => "delete_record",
        VoiceAction::Start { .. } => "start",
        VoiceAction::Stop => "stop",
        VoiceAction::Pause => "pause",
        VoiceAction::Resume => "resume",
        VoiceAction::Query { .. } => "query",
        VoiceAction::CreateLocation { .. } => "create_location",
        VoiceAction::DeleteLocation { .. } => "delete_location",
        VoiceAction::MarkDayType { .. } => "mark_day_type",
        VoiceAction::SendReport { .. } => "send_report",
        VoiceAction::Error { .. } => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::initialize::init_db;
    use chrono::{Duration, TimeZone};

    struct StubSecretary {
        suggestions: Vec<SuggestedCorrection>,
    }

    impl SecretaryClient for StubSecretary {
        fn clean_day(
            &self,
            _user_id: &str,
            _date: NaiveDate,
            _sessions: &[WorkSession],
            _profile: &WorkerProfile,
        ) -> AppResult<Vec<SuggestedCorrection>> {
            Ok(self.suggestions.clone())
        }
    }

    struct StubVoice(VoiceAction);

    impl VoiceClient for StubVoice {
        fn interpret(&self, _transcript: &str, _context: &VoiceContext) -> AppResult<VoiceAction> {
            Ok(self.0.clone())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn setup() -> (DbPool, Config) {
        let pool = DbPool::new(":memory:").unwrap();
        init_db(&pool.conn).unwrap();
        let mut cfg = Config::default();
        cfg.user_id = "u1".to_string();
        (pool, cfg)
    }

    fn gps_session(pool: &DbPool, enter: DateTime<Utc>, mins: i64) -> WorkSession {
        let mut s = WorkSession::open(
            "u1",
            Some("loc-1".into()),
            Some("Depot".into()),
            enter,
            SessionSource::Gps,
            1.0,
            enter,
        );
        s.exit_at = Some(enter + Duration::minutes(mins));
        s.duration_min = Some(mins);
        sessions::insert_session(&pool.conn, &s).unwrap();
        s
    }

    fn suggest(session: &WorkSession, field: &str, to: &str) -> SuggestedCorrection {
        SuggestedCorrection {
            session_id: session.id.clone(),
            field: field.to_string(),
            from: None,
            to: Some(to.to_string()),
            reason: "test".to_string(),
        }
    }

    #[test]
    fn cleanup_applies_a_valid_suggestion_with_audit() {
        let (mut pool, _cfg) = setup();
        let s = gps_session(&pool, t0(), 570);
        let new_exit = t0() + Duration::minutes(550);

        let stub = StubSecretary {
            suggestions: vec![suggest(&s, "exit_at", &crate::db::db_utils::ts(new_exit))],
        };
        let report = AiLogic::clean_with(&stub, &mut pool, "u1", day(), t0()).unwrap();
        assert_eq!(report.applied, 1);
        assert!(report.failures.is_empty());

        let edited = sessions::get_session(&pool.conn, &s.id).unwrap().unwrap();
        assert_eq!(edited.exit_at, Some(new_exit));
        assert_eq!(edited.duration_min, Some(550));
        assert_eq!(edited.source, SessionSource::Secretary);

        let audit = corrections::list_for_session(&pool.conn, &s.id).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].field, "exit_at");
        assert_eq!(
            audit[0].original_value,
            Some(crate::db::db_utils::ts(t0() + Duration::minutes(570)))
        );
        assert_eq!(audit[0].corrected_value, Some(crate::db::db_utils::ts(new_exit)));
    }

    #[test]
    fn cleanup_skips_noops_and_collects_failures() {
        let (mut pool, _cfg) = setup();
        let s = gps_session(&pool, t0(), 60);

        let stub = StubSecretary {
            suggestions: vec![
                // Already the current value: skip, no audit row.
                suggest(&s, "break_min", "0"),
                // Unknown field: failure.
                suggest(&s, "mood", "great"),
                // Unknown session: failure.
                SuggestedCorrection {
                    session_id: "nope".to_string(),
                    field: "notes".to_string(),
                    from: None,
                    to: Some("x".to_string()),
                    reason: "test".to_string(),
                },
            ],
        };
        let report = AiLogic::clean_with(&stub, &mut pool, "u1", day(), t0()).unwrap();
        assert_eq!(report.suggested, 3);
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(corrections::list_for_session(&pool.conn, &s.id).unwrap().is_empty());
    }

    #[test]
    fn cleanup_cannot_overwrite_human_rows() {
        let (mut pool, _cfg) = setup();
        let mut s = gps_session(&pool, t0(), 60);
        s.source = SessionSource::Manual;
        sessions::update_session(&pool.conn, &s).unwrap();

        let stub = StubSecretary {
            suggestions: vec![suggest(&s, "break_min", "30")],
        };
        let report = AiLogic::clean_with(&stub, &mut pool, "u1", day(), t0()).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.failures.len(), 1);

        let row = sessions::get_session(&pool.conn, &s.id).unwrap().unwrap();
        assert_eq!(row.break_secs, 0);
    }

    #[test]
    fn unconfigured_endpoint_is_a_quiet_success() {
        let (mut pool, cfg) = setup();
        gps_session(&pool, t0(), 60);

        let report = AiLogic::run_cleanup(&mut pool, &cfg, "u1", day(), t0()).unwrap();
        assert_eq!(report.suggested, 0);
        assert_eq!(report.applied, 0);
    }

    #[test]
    fn voice_stop_closes_the_open_session() {
        let (mut pool, cfg) = setup();
        UseCaseLogic::start_manual(&mut pool, &cfg, None, SessionSource::Manual, t0(), t0())
            .unwrap();

        let stub = StubVoice(VoiceAction::Stop);
        let context = VoiceContext::gather(&pool.conn, &cfg, t0()).unwrap();
        let action = stub.interpret("done for today", &context).unwrap();
        let outcome =
            AiLogic::apply_voice(&mut pool, &cfg, action, t0() + Duration::hours(8)).unwrap();

        match outcome {
            VoiceOutcome::Stopped(s) => assert_eq!(s.duration_min, Some(480)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn voice_error_action_surfaces_as_error() {
        let (mut pool, cfg) = setup();
        let err = AiLogic::apply_voice(
            &mut pool,
            &cfg,
            VoiceAction::Error {
                message: "could not understand".to_string(),
            },
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Ai(_)));
    }

    #[test]
    fn voice_marks_a_day_type() {
        let (mut pool, cfg) = setup();
        let outcome = AiLogic::apply_voice(
            &mut pool,
            &cfg,
            VoiceAction::MarkDayType {
                date: "2025-03-12".to_string(),
                kind: "vacation".to_string(),
            },
            t0(),
        )
        .unwrap();
        assert!(matches!(outcome, VoiceOutcome::DayMarked { .. }));
    }

    #[test]
    fn voice_action_wire_format_round_trips() {
        let json = r#"{"action":"update_record","session_id":"s1","field":"exit_at","value":"2025-03-10T17:00:00Z"}"#;
        let action: VoiceAction = serde_json::from_str(json).unwrap();
        assert_eq!(
            action,
            VoiceAction::UpdateRecord {
                session_id: "s1".to_string(),
                field: "exit_at".to_string(),
                value: Some("2025-03-10T17:00:00Z".to_string()),
            }
        );

        let stop: VoiceAction = serde_json::from_str(r#"{"action":"stop"}"#).unwrap();
        assert_eq!(stop, VoiceAction::Stop);
    }

    #[test]
    fn profile_medians_ignore_empty_days() {
        let (pool, _cfg) = setup();
        for (i, total) in [480_i64, 500, 520].iter().enumerate() {
            let date = day() - Duration::days(i as i64 + 1);
            let s = crate::core::summary::build_summary(
                "u1",
                date,
                &[{
                    let mut w = WorkSession::open(
                        "u1",
                        None,
                        Some("Depot".into()),
                        Utc.with_ymd_and_hms(2025, 3, 9 - i as u32, 8, 0, 0).unwrap(),
                        SessionSource::Gps,
                        1.0,
                        t0(),
                    );
                    w.exit_at = Some(w.enter_at + Duration::minutes(*total));
                    w.duration_min = Some(*total);
                    w
                }],
                false,
                None,
                t0(),
            );
            summaries::upsert_summary(&pool.conn, &s).unwrap();
        }

        let profile = WorkerProfile::compute(&pool.conn, "u1", day()).unwrap();
        assert_eq!(profile.days_counted, 3);
        assert_eq!(profile.median_total_min, Some(500));
        assert_eq!(profile.median_start_min, Some(480));
    }
}
