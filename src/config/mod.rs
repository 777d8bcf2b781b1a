use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use uuid::Uuid;

pub mod migrate; // use submodule at src/config/migrate.rs

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: String,
    /// Owner of every row this device writes.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Stable id of this installation, sent with every sync request.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Sync backend base URL. Unset → the device runs offline-only.
    #[serde(default)]
    pub sync_url: Option<String>,
    #[serde(default)]
    pub sync_api_key: Option<String>,
    #[serde(default = "default_sync_enabled")]
    pub sync_enabled: bool,
    /// AI sidecar base URL (secretary + voice). Unset → those features are
    /// quiet no-ops.
    #[serde(default)]
    pub ai_url: Option<String>,
    #[serde(default)]
    pub ai_api_key: Option<String>,
    /// How often the platform scheduler should fire `fieldlog heartbeat`.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// How long a heartbeat waits for a location fix before calling it
    /// unavailable.
    #[serde(default = "default_fix_timeout_secs")]
    pub fix_timeout_secs: u64,
}

fn default_user_id() -> String {
    "default".to_string()
}
fn default_device_id() -> String {
    "local".to_string()
}
fn default_sync_enabled() -> bool {
    true
}
fn default_heartbeat_secs() -> u64 {
    300
}
fn default_fix_timeout_secs() -> u64 {
    8
}

impl Default for Config {
    fn default() -> Self {
        let db_path = Self::database_file();
        Self {
            database: db_path.to_string_lossy().to_string(),
            user_id: default_user_id(),
            device_id: default_device_id(),
            sync_url: None,
            sync_api_key: None,
            sync_enabled: default_sync_enabled(),
            ai_url: None,
            ai_api_key: None,
            heartbeat_secs: default_heartbeat_secs(),
            fix_timeout_secs: default_fix_timeout_secs(),
        }
    }
}

impl Config {
    /// Return the standard configuration directory depending on the platform
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(appdata).join("fieldlog")
        } else {
            let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".fieldlog")
        }
    }

    /// Return the full path of the config file
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("fieldlog.conf")
    }

    /// Return the full path of the SQLite database
    pub fn database_file() -> PathBuf {
        Self::config_dir().join("fieldlog.sqlite")
    }

    /// Resolve a user-supplied database path: `~` expanded, bare names
    /// placed inside the config directory.
    pub fn resolve_db_path(name: &str) -> PathBuf {
        let p = crate::utils::path::expand_tilde(name);
        if p.is_absolute() { p } else { Self::config_dir().join(p) }
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> Self {
        let path = Self::config_file();

        if path.exists() {
            let content = fs::read_to_string(&path).expect("❌ Failed to read configuration file");
            serde_yaml::from_str(&content).expect("❌ Failed to parse configuration file")
        } else {
            Config::default()
        }
    }

    /// Persist the configuration back to the YAML file.
    pub fn save(&self) -> AppResult<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        let yaml = serde_yaml::to_string(self).map_err(|_| AppError::ConfigSave)?;
        fs::write(Self::config_file(), yaml).map_err(|_| AppError::ConfigSave)?;
        Ok(())
    }

    /// Initialize configuration and database files
    pub fn init_all(custom_name: Option<String>, is_test: bool) -> io::Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;

        // DB name: user provided or default
        let db_path = if let Some(name) = custom_name {
            Self::resolve_db_path(&name)
        } else {
            dir.join("fieldlog.sqlite")
        };

        let config = Config {
            database: db_path.to_string_lossy().to_string(),
            device_id: Uuid::new_v4().to_string(),
            ..Config::default()
        };

        // Write config file
        if !is_test {
            let yaml = serde_yaml::to_string(&config)
                .map_err(|e| io::Error::other(format!("serialize error: {e}")))?;
            let mut file = fs::File::create(Self::config_file())?;
            file.write_all(yaml.as_bytes())?;
            println!("✅ Config file: {:?}", Self::config_file());
        }

        // Create empty DB file if not exists
        if !db_path.exists() {
            fs::File::create(&db_path)?;
        }

        println!("✅ Database:    {:?}", db_path);

        Ok(())
    }

    /// True when a sync backend is both configured and enabled.
    pub fn sync_configured(&self) -> bool {
        self.sync_enabled
            && self
                .sync_url
                .as_deref()
                .is_some_and(|u| !u.is_empty())
    }

    /// True when the AI sidecar is configured.
    pub fn ai_configured(&self) -> bool {
        self.ai_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}
