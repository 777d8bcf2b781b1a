use crate::ui::messages::success;
use rusqlite::{Connection, Error, OptionalExtension, Result};

/// Ensure that the `log` table exists with the modern schema.
fn ensure_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Check if a migration version was already recorded in the log.
fn migration_applied(conn: &Connection, version: &str) -> Result<bool> {
    let mut chk = conn.prepare(
        "SELECT 1 FROM log
         WHERE operation = 'migration_applied' AND target = ?1
         LIMIT 1",
    )?;
    Ok(chk.query_row([version], |_| Ok(())).optional()?.is_some())
}

/// Record a migration version in the log.
fn mark_applied(conn: &Connection, version: &str, message: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO log (date, operation, target, message)
         VALUES (datetime('now'), 'migration_applied', ?1, ?2)",
        [version, message],
    )?;
    Ok(())
}

/// Check if the given table exists.
fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
    let exists: Option<String> = stmt.query_row([name], |row| row.get(0)).optional()?;
    Ok(exists.is_some())
}

/// Check if a table has a given column.
fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info('{table}')"))?;
    let cols = stmt.query_map([], |row| row.get::<_, String>(1))?;

    for c in cols {
        if c? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Baseline schema: all tables and indexes of the first release.
fn migrate_base_schema(conn: &Connection) -> Result<()> {
    let version = "20250901_0001_base_schema";

    if migration_applied(conn, version)? {
        return Ok(());
    }

    // DB created before schema versioning → just record the baseline.
    if table_exists(conn, "work_sessions")? {
        mark_applied(conn, version, "Baseline schema already present")?;
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS work_sessions (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            location_id   TEXT,
            location_name TEXT,
            enter_at      TEXT NOT NULL,
            exit_at       TEXT,
            break_secs    INTEGER NOT NULL DEFAULT 0,
            duration_min  INTEGER,
            source        TEXT NOT NULL DEFAULT 'gps'
                          CHECK(source IN ('gps','headless','manual','voice','secretary')),
            confidence    REAL NOT NULL DEFAULT 1.0,
            notes         TEXT NOT NULL DEFAULT '',
            meta          TEXT NOT NULL DEFAULT '{}',
            deleted       INTEGER NOT NULL DEFAULT 0,
            synced        INTEGER NOT NULL DEFAULT 0,
            synced_at     TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_open
            ON work_sessions(user_id) WHERE exit_at IS NULL AND deleted = 0;
        CREATE INDEX IF NOT EXISTS idx_sessions_enter_at ON work_sessions(user_id, enter_at);
        CREATE INDEX IF NOT EXISTS idx_sessions_dirty ON work_sessions(synced, updated_at);

        CREATE TABLE IF NOT EXISTS active_tracking (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            status          TEXT NOT NULL DEFAULT 'IDLE'
                            CHECK(status IN ('IDLE','TRACKING','EXIT_PENDING')),
            session_id      TEXT,
            fence_id        TEXT,
            fence_name      TEXT,
            entered_at      TEXT,
            pending_exit_at TEXT,
            cooldown_until  TEXT,
            pause_secs      INTEGER NOT NULL DEFAULT 0,
            updated_at      TEXT NOT NULL
        );

        INSERT OR IGNORE INTO active_tracking (id, status, updated_at)
            VALUES (1, 'IDLE', strftime('%Y-%m-%dT%H:%M:%SZ', 'now'));

        CREATE TABLE IF NOT EXISTS geofence_locations (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL,
            name       TEXT NOT NULL,
            lat        REAL NOT NULL,
            lng        REAL NOT NULL,
            radius_m   REAL NOT NULL,
            deleted    INTEGER NOT NULL DEFAULT 0,
            synced     INTEGER NOT NULL DEFAULT 0,
            synced_at  TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS day_summaries (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            date             TEXT NOT NULL,
            total_min        INTEGER NOT NULL DEFAULT 0,
            break_min        INTEGER NOT NULL DEFAULT 0,
            first_enter      TEXT,
            last_exit        TEXT,
            session_count    INTEGER NOT NULL DEFAULT 0,
            primary_location TEXT,
            source_mix       TEXT NOT NULL DEFAULT '{}',
            flags            TEXT NOT NULL DEFAULT '[]',
            deleted          INTEGER NOT NULL DEFAULT 0,
            synced           INTEGER NOT NULL DEFAULT 0,
            synced_at        TEXT,
            updated_at       TEXT NOT NULL,
            UNIQUE(user_id, date)
        );

        CREATE TABLE IF NOT EXISTS ai_corrections (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            field           TEXT NOT NULL,
            original_value  TEXT NOT NULL DEFAULT '',
            corrected_value TEXT NOT NULL DEFAULT '',
            reason          TEXT NOT NULL DEFAULT '',
            reverted        INTEGER NOT NULL DEFAULT 0,
            deleted         INTEGER NOT NULL DEFAULT 0,
            synced          INTEGER NOT NULL DEFAULT 0,
            synced_at       TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_corrections_session ON ai_corrections(session_id);

        CREATE TABLE IF NOT EXISTS effects_queue (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            kind       TEXT NOT NULL,
            payload    TEXT NOT NULL DEFAULT '{}',
            status     TEXT NOT NULL DEFAULT 'pending'
                       CHECK(status IN ('pending','done','failed')),
            attempts   INTEGER NOT NULL DEFAULT 0,
            priority   TEXT NOT NULL DEFAULT 'normal'
                       CHECK(priority IN ('critical','normal')),
            run_after  TEXT,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_queue_pending ON effects_queue(status, run_after);

        CREATE TABLE IF NOT EXISTS session_guard (
            session_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            warned     INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_state (
            table_name       TEXT PRIMARY KEY,
            last_download_at TEXT,
            last_upload_at   TEXT,
            updated_at       TEXT NOT NULL
        );
        "#,
    )?;

    mark_applied(conn, version, "Created baseline schema")?;
    success(format!("Migration applied: {} → baseline schema", version));

    Ok(())
}

/// Add the `outside_count` column used by the heartbeat consistency check.
fn migrate_add_outside_count(conn: &Connection) -> Result<(), Error> {
    let version = "20251102_0002_outside_count";

    // 1) Verifica se già applicata
    if migration_applied(conn, version)? {
        return Ok(());
    }

    // 2) Esegui la migrazione (column check covers DBs touched by dev builds)
    if !has_column(conn, "active_tracking", "outside_count")? {
        conn.execute(
            "ALTER TABLE active_tracking ADD COLUMN outside_count INTEGER NOT NULL DEFAULT 0;",
            [],
        )
        .map_err(|e| {
            Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(format!("Failed to add 'outside_count' column: {}", e)),
            )
        })?;
    }

    // 3) Marca come applicata
    mark_applied(
        conn,
        version,
        "Added outside_count to active_tracking",
    )?;

    success(format!(
        "Migration applied: {} → added 'outside_count' to active_tracking",
        version
    ));

    Ok(())
}

/// Public entry point: run all pending migrations.
///
/// Invocata da db::init_db().
pub fn run_pending_migrations(conn: &Connection) -> Result<()> {
    // 1) Ensure log table
    ensure_log_table(conn)?;

    // 2) Baseline schema
    migrate_base_schema(conn)?;

    // 3) Incremental migrations
    migrate_add_outside_count(conn)?;

    // 4) Config file upgrades ride the same version log
    crate::config::migrate::run_config_migration(conn)?;

    Ok(())
}
