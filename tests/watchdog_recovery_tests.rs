use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

mod common;
use common::{
    add_office, cursor_status, enter_at, fl, heartbeat_at, init_db, open_session_id,
    session_count, setup_test_db,
};

fn session_row(db_path: &str, id: &str) -> (Option<i64>, f64) {
    let conn = rusqlite::Connection::open(db_path).expect("open db");
    conn.query_row(
        "SELECT duration_min, confidence FROM work_sessions WHERE id = ?1",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .expect("session row")
}

#[test]
fn guard_forces_close_after_sixteen_hours() {
    let db = setup_test_db("guard_force");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");
    let id = open_session_id(&db).expect("open session");

    fl().args(["--db", &db, "--test", "heartbeat", "--at", "2025-03-11 00:30"])
        .assert()
        .success()
        .stdout(contains("force-closed"));

    assert!(open_session_id(&db).is_none());
    assert_eq!(cursor_status(&db), "IDLE");

    // Chiusura retrodatata a enter + 16h, confidenza da guard.
    let (duration, confidence) = session_row(&db, &id);
    assert_eq!(duration, Some(960));
    assert!((confidence - 0.3).abs() < 1e-9);
}

#[test]
fn guard_does_not_fire_just_under_sixteen_hours() {
    let db = setup_test_db("guard_under");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");

    fl().args(["--db", &db, "--test", "heartbeat", "--at", "2025-03-10 23:59"])
        .assert()
        .success()
        .stdout(contains("force-closed").not());

    assert!(open_session_id(&db).is_some());
}

#[test]
fn guard_warns_once_at_ten_hours() {
    let db = setup_test_db("guard_warn");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");

    fl().args(["--db", &db, "--test", "heartbeat", "--at", "2025-03-10 18:30"])
        .assert()
        .success()
        .stdout(contains("long session(s) warned"));

    // Ancora aperta, e il warning non si ripete.
    assert!(open_session_id(&db).is_some());

    fl().args(["--db", &db, "--test", "heartbeat", "--at", "2025-03-10 18:45"])
        .assert()
        .success()
        .stdout(contains("long session(s) warned").not());
}

#[test]
fn two_outside_fixes_synthesize_an_exit() {
    let db = setup_test_db("outside_fixes");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");

    // Primo fix fuori dal fence: solo contato.
    fl().args([
        "--db", &db, "--test", "heartbeat", "--at", "2025-03-10 09:00", "--lat", "45.6000",
        "--lng", "9.4000",
    ])
    .assert()
    .success()
    .stdout(contains("outside the tracked fence (1 in a row)"));

    assert_eq!(cursor_status(&db), "TRACKING");

    // Secondo consecutivo: exit sintetico, parte il cooldown.
    fl().args([
        "--db", &db, "--test", "heartbeat", "--at", "2025-03-10 09:05", "--lat", "45.6000",
        "--lng", "9.4000",
    ])
    .assert()
    .success()
    .stdout(contains("exit synthesized"));

    assert_eq!(cursor_status(&db), "EXIT_PENDING");

    // Il cooldown scade al giro successivo.
    heartbeat_at(&db, "2025-03-10 09:10");
    assert_eq!(cursor_status(&db), "IDLE");
    assert!(open_session_id(&db).is_none());
}

#[test]
fn inside_fix_resets_the_outside_count() {
    let db = setup_test_db("inside_reset");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");

    fl().args([
        "--db", &db, "--test", "heartbeat", "--at", "2025-03-10 09:00", "--lat", "45.6000",
        "--lng", "9.4000",
    ])
    .assert()
    .success()
    .stdout(contains("(1 in a row)"));

    // Dentro il fence: il contatore riparte.
    fl().args([
        "--db", &db, "--test", "heartbeat", "--at", "2025-03-10 09:05", "--lat", "45.4642",
        "--lng", "9.1900",
    ])
    .assert()
    .success()
    .stdout(contains("inside the tracked fence"));

    fl().args([
        "--db", &db, "--test", "heartbeat", "--at", "2025-03-10 09:10", "--lat", "45.6000",
        "--lng", "9.4000",
    ])
    .assert()
    .success()
    .stdout(contains("(1 in a row)"));

    assert!(open_session_id(&db).is_some());
}

#[test]
fn recovery_rehydrates_the_cursor_without_new_rows() {
    let db = setup_test_db("recover_rehydrate");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");
    let id = open_session_id(&db).expect("open session");

    // Simula un cursore perso (es. ripristino da backup).
    {
        let conn = rusqlite::Connection::open(&db).expect("open db");
        conn.execute(
            "UPDATE active_tracking SET status = 'IDLE', session_id = NULL,
             fence_id = NULL, fence_name = NULL, entered_at = NULL WHERE id = 1",
            [],
        )
        .expect("blank cursor");
    }

    fl().args(["--db", &db, "--test", "recover", "--at", "2025-03-10 09:00"])
        .assert()
        .success()
        .stdout(contains("Cursor rebuilt"));

    assert_eq!(cursor_status(&db), "TRACKING");
    assert_eq!(open_session_id(&db).as_deref(), Some(id.as_str()));
    assert_eq!(session_count(&db), 1);
}

#[test]
fn recovery_resets_a_cursor_pointing_at_a_closed_session() {
    let db = setup_test_db("recover_reset");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");
    let id = open_session_id(&db).expect("open session");

    fl().args([
        "--db", &db, "--test", "track", "exit", "--fence", "office", "--at",
        "2025-03-10 12:00",
    ])
    .assert()
    .success();
    heartbeat_at(&db, "2025-03-10 12:01");

    // Cursore corrotto: punta alla sessione ormai chiusa.
    {
        let conn = rusqlite::Connection::open(&db).expect("open db");
        conn.execute(
            "UPDATE active_tracking SET status = 'TRACKING', session_id = ?1 WHERE id = 1",
            [&id],
        )
        .expect("corrupt cursor");
    }

    fl().args(["--db", &db, "--test", "recover", "--at", "2025-03-10 13:00"])
        .assert()
        .success()
        .stdout(contains("reset to IDLE"));

    assert_eq!(cursor_status(&db), "IDLE");
}

#[test]
fn recovery_probe_enters_when_standing_inside_a_fence() {
    let db = setup_test_db("recover_probe");
    init_db(&db);
    add_office(&db);

    fl().args([
        "--db", &db, "--test", "recover", "--at", "2025-03-10 08:00", "--probe-lat",
        "45.4642", "--probe-lng", "9.1900",
    ])
    .assert()
    .success()
    .stdout(contains("session opened"));

    assert_eq!(cursor_status(&db), "TRACKING");
    let id = open_session_id(&db).expect("probe-opened session");

    let conn = rusqlite::Connection::open(&db).expect("open db");
    let confidence: f64 = conn
        .query_row(
            "SELECT confidence FROM work_sessions WHERE id = ?1",
            [&id],
            |row| row.get(0),
        )
        .expect("session row");
    assert!((confidence - 0.5).abs() < 1e-9);
}

#[test]
fn recovery_never_closes_an_open_session() {
    let db = setup_test_db("recover_no_close");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");

    // Probe lontano dal fence: al boot non si sintetizzano mai exit.
    fl().args([
        "--db", &db, "--test", "recover", "--at", "2025-03-10 09:00", "--probe-lat",
        "45.9000", "--probe-lng", "9.9000",
    ])
    .assert()
    .success()
    .stdout(contains("consistent"));

    assert!(open_session_id(&db).is_some());
    assert_eq!(cursor_status(&db), "TRACKING");
}
