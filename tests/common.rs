#![allow(dead_code)]
use assert_cmd::{Command, cargo_bin_cmd};
use std::env;
use std::fs;
use std::path::PathBuf;

pub fn fl() -> Command {
    cargo_bin_cmd!("fieldlog")
}

/// Create a unique test DB path inside the system temp dir and remove any existing file
pub fn setup_test_db(name: &str) -> String {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("{}_fieldlog.sqlite", name));
    let db_path = path.to_string_lossy().to_string();
    fs::remove_file(&db_path).ok();
    db_path
}

/// Initialize schema + cursor via the CLI, exactly like a user would
pub fn init_db(db_path: &str) {
    fl().args(["--db", db_path, "--test", "init"])
        .assert()
        .success();
}

/// Register the default office fence used by most scenarios
pub fn add_office(db_path: &str) {
    fl().args([
        "--db", db_path, "--test", "fence", "add", "office", "--lat", "45.4642", "--lng", "9.1900",
        "--radius", "150",
    ])
    .assert()
    .success();
}

/// Feed one `track enter` at the given clock
pub fn enter_at(db_path: &str, fence: &str, at: &str) {
    fl().args([
        "--db", db_path, "--test", "track", "enter", "--fence", fence, "--at", at,
    ])
    .assert()
    .success();
}

/// Feed one `track exit` at the given clock
pub fn exit_at(db_path: &str, fence: &str, at: &str) {
    fl().args([
        "--db", db_path, "--test", "track", "exit", "--fence", fence, "--at", at,
    ])
    .assert()
    .success();
}

/// One heartbeat at the given clock, no fix
pub fn heartbeat_at(db_path: &str, at: &str) {
    fl().args(["--db", db_path, "--test", "heartbeat", "--at", at])
        .assert()
        .success();
}

/// The id of the single open session, straight from the DB
pub fn open_session_id(db_path: &str) -> Option<String> {
    let conn = rusqlite::Connection::open(db_path).expect("open db");
    conn.query_row(
        "SELECT id FROM work_sessions WHERE exit_at IS NULL AND deleted = 0",
        [],
        |row| row.get(0),
    )
    .ok()
}

/// Cursor status as stored ("IDLE", "TRACKING", "EXIT_PENDING")
pub fn cursor_status(db_path: &str) -> String {
    let conn = rusqlite::Connection::open(db_path).expect("open db");
    conn.query_row(
        "SELECT status FROM active_tracking WHERE id = 1",
        [],
        |row| row.get(0),
    )
    .expect("cursor row")
}

/// Count non-deleted sessions
pub fn session_count(db_path: &str) -> i64 {
    let conn = rusqlite::Connection::open(db_path).expect("open db");
    conn.query_row(
        "SELECT COUNT(*) FROM work_sessions WHERE deleted = 0",
        [],
        |row| row.get(0),
    )
    .expect("count")
}
