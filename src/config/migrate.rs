use crate::ui::messages::info;
use rusqlite::{Connection, Error, OptionalExtension};
use serde_yaml::Value;
use std::fs;

const VERSION: &str = "20251120_0003_sync_config_keys";

/// Keys introduced together with the sync/AI layer. Older config files
/// predate them; serde fills the defaults at load time, this migration
/// writes them into the YAML once so they are visible and editable.
pub(crate) fn missing_key_defaults() -> Vec<(&'static str, Value)> {
    vec![
        ("user_id", Value::String("default".to_string())),
        (
            "device_id",
            Value::String(uuid::Uuid::new_v4().to_string()),
        ),
        ("sync_url", Value::Null),
        ("sync_api_key", Value::Null),
        ("sync_enabled", Value::Bool(true)),
        ("ai_url", Value::Null),
        ("ai_api_key", Value::Null),
        (
            "heartbeat_secs",
            Value::Number(serde_yaml::Number::from(300)),
        ),
        (
            "fix_timeout_secs",
            Value::Number(serde_yaml::Number::from(8)),
        ),
    ]
}

/// Run the config migration once. Idempotent when used via
/// run_pending_migrations, which already checks applied versions. Returns
/// Err on critical failures so the caller does *not* mark it as applied.
pub fn run_config_migration(conn: &Connection) -> Result<(), Error> {
    // Ensure log table exists
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            operation TEXT NOT NULL,
            target TEXT DEFAULT '',
            message TEXT NOT NULL
        );",
    )?;

    // Check if this migration version is already marked as applied
    let mut chk = conn.prepare(
        "SELECT 1 FROM log WHERE operation = 'migration_applied' AND target = ?1 LIMIT 1",
    )?;
    if chk.query_row([VERSION], |_| Ok(())).optional()?.is_some() {
        return Ok(());
    }

    let conf_file = super::Config::config_file();
    let mut added: Vec<&str> = Vec::new();

    if conf_file.exists() {
        let content = fs::read_to_string(&conf_file).map_err(|e| {
            Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(format!("Failed to read config {:?}: {}", conf_file, e)),
            )
        })?;

        if let Ok(mut yaml) = serde_yaml::from_str::<Value>(&content)
            && let Some(map) = yaml.as_mapping_mut()
        {
            for (name, default) in missing_key_defaults() {
                let key = Value::String(name.to_string());
                if !map.contains_key(&key) {
                    map.insert(key, default);
                    added.push(name);
                }
            }

            if !added.is_empty() {
                let serialized = serde_yaml::to_string(&yaml).map_err(|e| {
                    Error::SqliteFailure(
                        rusqlite::ffi::Error::new(1),
                        Some(format!(
                            "Failed to serialize updated config {:?}: {}",
                            conf_file, e
                        )),
                    )
                })?;

                // Inject documentation comment right after the `sync_enabled` line
                let mut new_content = String::new();
                for line in serialized.lines() {
                    new_content.push_str(line);
                    new_content.push('\n');

                    if line.starts_with("sync_enabled:") {
                        new_content.push_str(
                            "  # sync keys:\n\
                             #   sync_url    → backend base URL; unset = offline-only device\n\
                             #   ai_url      → AI sidecar base URL; unset = secretary/voice disabled\n\
                             #   device_id   → stable id of this installation, do not share\n",
                        );
                    }
                }

                fs::write(&conf_file, new_content).map_err(|e| {
                    Error::SqliteFailure(
                        rusqlite::ffi::Error::new(1),
                        Some(format!(
                            "Failed to write updated config {:?}: {}",
                            conf_file, e
                        )),
                    )
                })?;
            }
        }
    }

    let msg = format!("Config keys checked ({} added)", added.len());
    conn.execute(
        "INSERT INTO log (date, operation, target, message)
         VALUES (datetime('now'), 'migration_applied', ?1, ?2)",
        [VERSION, msg.as_str()],
    )?;

    if !added.is_empty() {
        info(format!(
            "Config migration ({}) added keys: {}",
            VERSION,
            added.join(", ")
        ));
    }

    Ok(())
}
