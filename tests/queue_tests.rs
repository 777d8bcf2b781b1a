use chrono::{DateTime, TimeZone, Utc};
use predicates::str::contains;
use std::sync::{Mutex, PoisonError};

use fieldlog::config::Config;
use fieldlog::core::effects::EffectsLogic;
use fieldlog::db::pool::DbPool;
use fieldlog::db::queue;
use fieldlog::models::effect::EffectRequest;
use fieldlog::platform::AppEnv;

mod common;
use common::{add_office, enter_at, exit_at, fl, heartbeat_at, init_db, setup_test_db};

// The drain is single-flight per process. Tests in this binary that call
// it through the library serialize here; CLI tests run in their own
// processes and do not care.
static DRAIN_LOCK: Mutex<()> = Mutex::new(());

fn t(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
}

fn queue_row(db: &str, id: i64) -> (String, i64, Option<String>) {
    let conn = rusqlite::Connection::open(db).expect("open db");
    conn.query_row(
        "SELECT status, attempts, run_after FROM effects_queue WHERE id = ?1",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .expect("queue row")
}

#[test]
fn offline_sync_retries_on_the_shortest_rung() {
    let _guard = DRAIN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let db = setup_test_db("offline_rung");
    init_db(&db);

    // Porta 9 (discard): connessione rifiutata, quindi Offline.
    let cfg = Config {
        database: db.clone(),
        sync_url: Some("http://127.0.0.1:9".to_string()),
        ..Config::default()
    };
    let mut pool = DbPool::new(&db).expect("pool");
    let env = AppEnv::cli(None);

    let id = queue::enqueue(&pool.conn, &EffectRequest::SyncNow, t(8, 0)).expect("enqueue");

    let report = EffectsLogic::drain(&mut pool, &cfg, &env, t(8, 0)).expect("drain");
    assert_eq!(report.retried, 1);

    let (status, attempts, run_after) = queue_row(&db, id);
    assert_eq!(status, "pending");
    assert_eq!(attempts, 1);
    // Offline: sempre il gradino da 1 minuto, mai la scala piena.
    assert_eq!(run_after.as_deref(), Some("2025-03-10T08:01:00Z"));

    // Non eleggibile prima del run_after.
    let report = EffectsLogic::drain(&mut pool, &cfg, &env, t(8, 0)).expect("drain");
    assert_eq!(report.retried, 0);
    assert_eq!(report.executed, 0);

    // Al secondo fallimento il gradino resta 1 minuto.
    let report = EffectsLogic::drain(&mut pool, &cfg, &env, t(8, 2)).expect("drain");
    assert_eq!(report.retried, 1);
    let (_, attempts, run_after) = queue_row(&db, id);
    assert_eq!(attempts, 2);
    assert_eq!(run_after.as_deref(), Some("2025-03-10T08:03:00Z"));
}

#[test]
fn poisoned_normal_effect_dead_letters_after_three_attempts() {
    let _guard = DRAIN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let db = setup_test_db("dead_letter");
    init_db(&db);

    let cfg = Config {
        database: db.clone(),
        ..Config::default()
    };
    let mut pool = DbPool::new(&db).expect("pool");
    let env = AppEnv::cli(None);

    // Payload corrotto scritto a mano: il decode fallirà a ogni tentativo.
    pool.conn
        .execute(
            "INSERT INTO effects_queue (kind, payload, status, attempts, priority, created_at, updated_at)
             VALUES ('fence_settle_probe', '{\"fence_id\": 5}', 'pending', 0, 'normal',
                     '2025-03-10T07:00:00Z', '2025-03-10T07:00:00Z')",
            [],
        )
        .expect("raw enqueue");
    let id = pool.conn.last_insert_rowid();

    EffectsLogic::drain(&mut pool, &cfg, &env, t(8, 0)).expect("drain 1");
    let (status, attempts, _) = queue_row(&db, id);
    assert_eq!((status.as_str(), attempts), ("pending", 1));

    EffectsLogic::drain(&mut pool, &cfg, &env, t(8, 2)).expect("drain 2");
    let (status, attempts, _) = queue_row(&db, id);
    assert_eq!((status.as_str(), attempts), ("pending", 2));

    let report = EffectsLogic::drain(&mut pool, &cfg, &env, t(8, 10)).expect("drain 3");
    assert_eq!(report.dead, 1);
    let (status, attempts, _) = queue_row(&db, id);
    assert_eq!((status.as_str(), attempts), ("failed", 3));
}

#[test]
fn critical_effect_never_dead_letters_and_caps_the_ladder() {
    let _guard = DRAIN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let db = setup_test_db("critical_cap");
    init_db(&db);

    let cfg = Config {
        database: db.clone(),
        ..Config::default()
    };
    let mut pool = DbPool::new(&db).expect("pool");
    let env = AppEnv::cli(None);

    // Data illeggibile: il rebuild fallisce sempre, ma è critico.
    pool.conn
        .execute(
            "INSERT INTO effects_queue (kind, payload, status, attempts, priority, created_at, updated_at)
             VALUES ('rebuild_day_summary', '{\"user_id\":\"default\",\"date\":\"not-a-date\"}',
                     'pending', 0, 'critical',
                     '2025-03-10T07:00:00Z', '2025-03-10T07:00:00Z')",
            [],
        )
        .expect("raw enqueue");
    let id = pool.conn.last_insert_rowid();

    // 1m, 5m, 15m, 60m, 60m: la scala si ferma sull'ultimo gradino.
    let clocks = [t(8, 0), t(8, 2), t(8, 10), t(8, 30), t(10, 0)];
    for now in clocks {
        EffectsLogic::drain(&mut pool, &cfg, &env, now).expect("drain");
    }

    let (status, attempts, run_after) = queue_row(&db, id);
    assert_eq!(status, "pending");
    assert_eq!(attempts, 5);
    assert_eq!(run_after.as_deref(), Some("2025-03-10T11:00:00Z"));
}

#[test]
fn queue_print_shows_settled_and_pending_rows() {
    let db = setup_test_db("queue_print");
    init_db(&db);
    add_office(&db);

    enter_at(&db, "office", "2025-03-10 08:00");
    exit_at(&db, "office", "2025-03-10 12:00");
    heartbeat_at(&db, "2025-03-10 12:01");

    fl().args(["--db", &db, "--test", "queue", "--print"])
        .assert()
        .success()
        .stdout(contains("rebuild_day_summary"))
        .stdout(contains("sync_now"))
        .stdout(contains("done"));
}

#[test]
fn manual_drain_reports_what_it_ran() {
    let db = setup_test_db("manual_drain");
    init_db(&db);

    let pool = DbPool::new(&db).expect("pool");
    queue::enqueue(&pool.conn, &EffectRequest::UiRefresh, t(8, 0)).expect("enqueue");
    drop(pool);

    fl().args([
        "--db",
        &db,
        "--test",
        "queue",
        "--drain",
        "--at",
        "2025-03-10 08:05",
    ])
    .assert()
    .success()
    .stdout(contains("1 executed"));
}
