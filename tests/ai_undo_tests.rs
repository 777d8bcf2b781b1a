use chrono::{NaiveDate, TimeZone, Utc};
use predicates::str::contains;

use fieldlog::config::Config;
use fieldlog::core::ai::{AiLogic, SecretaryClient, SuggestedCorrection, WorkerProfile};
use fieldlog::db::pool::DbPool;
use fieldlog::errors::AppResult;
use fieldlog::models::session::WorkSession;

mod common;
use common::{add_office, enter_at, exit_at, fl, heartbeat_at, init_db, setup_test_db};

/// Canned secretary: always returns the same suggestion.
struct OneSuggestion(SuggestedCorrection);

impl SecretaryClient for OneSuggestion {
    fn clean_day(
        &self,
        _user_id: &str,
        _date: NaiveDate,
        _day_sessions: &[WorkSession],
        _profile: &WorkerProfile,
    ) -> AppResult<Vec<SuggestedCorrection>> {
        Ok(vec![self.0.clone()])
    }
}

fn seed_closed_session(db: &str) -> String {
    add_office(db);
    enter_at(db, "office", "2025-03-10 08:00");
    exit_at(db, "office", "2025-03-10 12:00");
    heartbeat_at(db, "2025-03-10 12:01");

    let conn = rusqlite::Connection::open(db).expect("open db");
    conn.query_row(
        "SELECT id FROM work_sessions WHERE exit_at IS NOT NULL",
        [],
        |row| row.get(0),
    )
    .expect("closed session")
}

#[test]
fn undo_restores_the_value_a_correction_overwrote() {
    let db = setup_test_db("undo_restores");
    init_db(&db);
    let session_id = seed_closed_session(&db);

    // Applica una correzione via il percorso della segretaria.
    let correction_id = {
        let mut pool = DbPool::new(&db).expect("pool");
        let client = OneSuggestion(SuggestedCorrection {
            session_id: session_id.clone(),
            field: "exit_at".to_string(),
            from: None,
            to: Some("2025-03-10 13:00".to_string()),
            reason: "usually leaves at 13".to_string(),
        });
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let report = AiLogic::clean_with(&client, &mut pool, "default", date, now).expect("clean");
        assert_eq!(report.applied, 1);

        let conn = rusqlite::Connection::open(&db).expect("open db");
        conn.query_row(
            "SELECT id FROM ai_corrections WHERE session_id = ?1 AND reverted = 0",
            [&session_id],
            |row| row.get::<_, String>(0),
        )
        .expect("correction row")
    };

    // La correzione ha spostato l'uscita alle 13:00.
    let conn = rusqlite::Connection::open(&db).expect("open db");
    let duration: i64 = conn
        .query_row(
            "SELECT duration_min FROM work_sessions WHERE id = ?1",
            [&session_id],
            |row| row.get(0),
        )
        .expect("session");
    assert_eq!(duration, 300);

    fl().args([
        "--db",
        &db,
        "--test",
        "undo",
        &correction_id,
        "--at",
        "2025-03-10 15:00",
    ])
    .assert()
    .success()
    .stdout(contains("undone"));

    // Valore originale ripristinato; il ripristino conta come azione umana.
    let (duration, source): (i64, String) = conn
        .query_row(
            "SELECT duration_min, source FROM work_sessions WHERE id = ?1",
            [&session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("session");
    assert_eq!(duration, 240);
    assert_eq!(source, "manual");

    let reverted: bool = conn
        .query_row(
            "SELECT reverted FROM ai_corrections WHERE id = ?1",
            [&correction_id],
            |row| row.get(0),
        )
        .expect("correction");
    assert!(reverted);
}

#[test]
fn undoing_twice_is_rejected() {
    let db = setup_test_db("undo_twice");
    init_db(&db);
    let session_id = seed_closed_session(&db);

    let correction_id = {
        let mut pool = DbPool::new(&db).expect("pool");
        let client = OneSuggestion(SuggestedCorrection {
            session_id: session_id.clone(),
            field: "break_min".to_string(),
            from: None,
            to: Some("30".to_string()),
            reason: "lunch is rarely skipped".to_string(),
        });
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        AiLogic::clean_with(&client, &mut pool, "default", date, now).expect("clean");

        let conn = rusqlite::Connection::open(&db).expect("open db");
        conn.query_row(
            "SELECT id FROM ai_corrections WHERE session_id = ?1",
            [&session_id],
            |row| row.get::<_, String>(0),
        )
        .expect("correction row")
    };

    fl().args(["--db", &db, "--test", "undo", &correction_id])
        .assert()
        .success();

    fl().args(["--db", &db, "--test", "undo", &correction_id])
        .assert()
        .failure()
        .stderr(contains("already undone"));
}

#[test]
fn ai_cleanup_without_endpoint_warns_and_exits_cleanly() {
    let db = setup_test_db("ai_unconfigured");
    init_db(&db);

    fl().args([
        "--db",
        &db,
        "--test",
        "ai",
        "cleanup",
        "--date",
        "2025-03-10",
    ])
    .assert()
    .success()
    .stdout(contains("No AI endpoint configured"));
}

#[test]
fn voice_without_endpoint_fails_with_a_clear_error() {
    let db = setup_test_db("voice_unconfigured");
    init_db(&db);

    fl().args(["--db", &db, "--test", "voice", "stop my shift"])
        .assert()
        .failure()
        .stderr(contains("no AI endpoint configured"));
}

#[test]
fn cleanup_marks_the_day_as_ai_corrected() {
    let db = setup_test_db("ai_corrected_flag");
    init_db(&db);
    let session_id = seed_closed_session(&db);

    let mut pool = DbPool::new(&db).expect("pool");
    let client = OneSuggestion(SuggestedCorrection {
        session_id,
        field: "exit_at".to_string(),
        from: None,
        to: Some("2025-03-10 12:30".to_string()),
        reason: "short tail".to_string(),
    });
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
    AiLogic::clean_with(&client, &mut pool, "default", date, now).expect("clean");

    // La correzione accoda il rebuild del giorno; il drain della CLI lo esegue.
    fl().args([
        "--db",
        &db,
        "--test",
        "queue",
        "--drain",
        "--at",
        "2025-03-10 14:05",
    ])
    .assert()
    .success();

    fl().args(["--db", &db, "--test", "summary", "--date", "2025-03-10"])
        .assert()
        .success()
        .stdout(contains("ai_corrected"));
}

/// Config construction used by library-level calls in this file.
#[test]
fn default_config_has_no_ai_endpoint() {
    let cfg = Config::default();
    assert!(!cfg.ai_configured());
    assert!(cfg.sync_url.is_none());
}
