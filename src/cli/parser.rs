use clap::{Parser, Subcommand};

/// Command-line interface definition for fieldlog
/// Offline-first attendance tracker for field workers, backed by SQLite
#[derive(Parser)]
#[command(
    name = "fieldlog",
    version = env!("CARGO_PKG_VERSION"),
    about = "Track on-site work sessions from geofence events, with an offline effects queue and optional sync",
    long_about = None
)]
pub struct Cli {
    /// Override database path (useful for tests or custom DB)
    #[arg(global = true, long = "db")]
    pub db: Option<String>,

    /// Run in test mode (no config file update)
    #[arg(global = true, long = "test", hide = true)]
    pub test: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Manage the configuration file (view or edit)
    Config {
        #[arg(long = "print", help = "Print the current configuration file")]
        print_config: bool,

        #[arg(long = "check", help = "Check configuration file for missing fields")]
        check: bool,

        #[arg(
            long = "edit",
            help = "Edit the configuration file (default editor: $EDITOR, or nano/vim/notepad)"
        )]
        edit_config: bool,

        #[arg(
            long = "editor",
            help = "Specify the editor to use (vim, nano, or custom path)"
        )]
        editor: Option<String>,
    },

    /// Manage the database (migrations, integrity checks, etc.)
    Db {
        #[arg(long = "migrate", help = "Run pending database migrations")]
        migrate: bool,

        #[arg(long = "check", help = "Check database integrity")]
        check: bool,

        #[arg(long = "vacuum", help = "Optimize the database using VACUUM")]
        vacuum: bool,

        #[arg(long = "info", help = "Show database information")]
        info: bool,
    },

    /// Print the internal operations log
    Log {
        #[arg(long = "print", help = "Print rows from the internal log table")]
        print: bool,
    },

    /// Feed a geofence transition through the tracking engine
    Track {
        #[command(subcommand)]
        action: TrackCmd,
    },

    /// Run one watchdog heartbeat (cooldowns, queue drain, guards, fix check)
    Heartbeat {
        /// Event clock override (RFC 3339 or "YYYY-MM-DD HH:MM")
        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,

        #[arg(long, help = "Latitude of the current GPS fix", requires = "lng")]
        lat: Option<f64>,

        #[arg(long, help = "Longitude of the current GPS fix", requires = "lat")]
        lng: Option<f64>,

        #[arg(long, help = "Horizontal accuracy of the fix in metres")]
        accuracy: Option<f64>,
    },

    /// Reconcile tracking state after a cold start
    Recover {
        /// Event clock override (RFC 3339 or "YYYY-MM-DD HH:MM")
        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,

        #[arg(
            long = "probe-lat",
            help = "Latitude of a location probe taken at boot",
            requires = "probe_lng"
        )]
        probe_lat: Option<f64>,

        #[arg(
            long = "probe-lng",
            help = "Longitude of a location probe taken at boot",
            requires = "probe_lat"
        )]
        probe_lng: Option<f64>,

        #[arg(long, help = "Horizontal accuracy of the probe in metres")]
        accuracy: Option<f64>,
    },

    /// Show the tracking cursor, the open session and the queue depth
    Status,

    /// List work sessions
    List {
        #[arg(
            long,
            short,
            help = "Filter by YYYY, YYYY-MM, YYYY-MM-DD or a START:END range"
        )]
        period: Option<String>,

        #[arg(long = "today", help = "Show only today's sessions")]
        today: bool,

        #[arg(long = "deleted", help = "Show tombstoned sessions instead of live ones")]
        deleted: bool,
    },

    /// Edit a work session (manual edits outrank sensor data)
    Edit {
        /// Session id
        id: String,

        #[arg(long = "enter", value_name = "TS", help = "New entry timestamp")]
        enter: Option<String>,

        #[arg(long = "exit", value_name = "TS", help = "New exit timestamp")]
        exit: Option<String>,

        #[arg(long = "break", value_name = "MIN", help = "New break total in minutes")]
        break_min: Option<i64>,

        #[arg(long = "notes", help = "Replace the session notes")]
        notes: Option<String>,

        /// Edit clock override (RFC 3339 or "YYYY-MM-DD HH:MM")
        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Soft-delete a work session (tombstone, propagated by sync)
    Del {
        /// Session id
        id: String,

        /// Deletion clock override
        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Pause the open session (break time is subtracted from the total)
    Pause {
        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Resume the paused session
    Resume {
        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Mark a whole day as sick, vacation, holiday, ...
    Absence {
        /// Day to mark (YYYY-MM-DD)
        date: String,

        #[arg(long = "kind", help = "Absence kind (lowercase identifier, e.g. sick)")]
        kind: String,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Manage geofence locations
    Fence {
        #[command(subcommand)]
        action: FenceCmd,
    },

    /// Show or rebuild a daily summary
    Summary {
        #[arg(long = "date", value_name = "DATE", help = "Day to show (default: today)")]
        date: Option<String>,

        #[arg(long = "rebuild", help = "Recompute the summary from its sessions first")]
        rebuild: bool,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Run one bidirectional sync cycle against the configured backend
    Sync {
        #[arg(long = "full", help = "Ignore download watermarks and pull everything")]
        full: bool,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Inspect or drain the durable effects queue
    Queue {
        #[arg(long = "print", help = "Print recent queue rows")]
        print: bool,

        #[arg(long = "drain", help = "Run every due pending effect now")]
        drain: bool,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// AI secretary operations
    Ai {
        #[command(subcommand)]
        action: AiCmd,
    },

    /// Revert an AI correction, restoring the value it overwrote
    Undo {
        /// Correction id
        id: String,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Interpret a voice transcript and execute the resulting action
    Voice {
        /// What the user said, as text
        transcript: String,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TrackCmd {
    /// The device entered a fence
    Enter {
        #[arg(long = "fence", help = "Fence id or name")]
        fence: String,

        /// Event clock override (RFC 3339 or "YYYY-MM-DD HH:MM")
        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,

        #[arg(long, help = "Latitude of the triggering fix", requires = "lng")]
        lat: Option<f64>,

        #[arg(long, help = "Longitude of the triggering fix", requires = "lat")]
        lng: Option<f64>,

        #[arg(long, help = "Horizontal accuracy of the fix in metres")]
        accuracy: Option<f64>,

        #[arg(long, help = "Event was delivered to a headless wake-up, not the UI")]
        headless: bool,
    },

    /// The device left a fence
    Exit {
        #[arg(long = "fence", help = "Fence id or name")]
        fence: String,

        /// Event clock override (RFC 3339 or "YYYY-MM-DD HH:MM")
        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,

        #[arg(long, help = "Latitude of the triggering fix", requires = "lng")]
        lat: Option<f64>,

        #[arg(long, help = "Longitude of the triggering fix", requires = "lat")]
        lng: Option<f64>,

        #[arg(long, help = "Horizontal accuracy of the fix in metres")]
        accuracy: Option<f64>,

        #[arg(long, help = "Event was delivered to a headless wake-up, not the UI")]
        headless: bool,
    },
}

#[derive(Subcommand)]
pub enum FenceCmd {
    /// Register a new geofence
    Add {
        /// Fence name (unique per user)
        name: String,

        #[arg(long, help = "Centre latitude (WGS84)")]
        lat: f64,

        #[arg(long, help = "Centre longitude (WGS84)")]
        lng: f64,

        #[arg(long = "radius", help = "Radius in metres (minimum 100)")]
        radius_m: f64,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Change a fence's name or geometry
    Update {
        /// Fence id or current name
        key: String,

        #[arg(long = "name", help = "New name")]
        name: Option<String>,

        #[arg(long, help = "New centre latitude", requires = "lng")]
        lat: Option<f64>,

        #[arg(long, help = "New centre longitude", requires = "lat")]
        lng: Option<f64>,

        #[arg(long = "radius", help = "New radius in metres")]
        radius_m: Option<f64>,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// Soft-delete a fence (its sessions are kept)
    Del {
        /// Fence id or name
        key: String,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },

    /// List active fences
    List,
}

#[derive(Subcommand)]
pub enum AiCmd {
    /// Ask the secretary endpoint to tidy up one day's closed sessions
    Cleanup {
        #[arg(long = "date", value_name = "DATE", help = "Day to clean (default: today)")]
        date: Option<String>,

        #[arg(long = "at", value_name = "TS")]
        at: Option<String>,
    },
}
