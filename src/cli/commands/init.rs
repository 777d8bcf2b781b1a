use crate::config::Config;
use crate::db::log;
use crate::errors::AppResult;

use crate::cli::parser::Cli;
use crate::db::initialize::init_db;
use rusqlite::Connection;

/// Handle the `init` command
///
/// This initializes:
///  - the config directory (if missing)
///  - the configuration file
///  - the SQLite database (prod or test mode)
///  - all pending DB migrations (schema + IDLE cursor seed)
pub fn handle(cli: &Cli) -> AppResult<()> {
    //
    // 1️⃣ PREPARA CONFIGURAZIONE
    //
    // Config::init_all crea:
    //   ~/.fieldlog/
    //   ~/.fieldlog/fieldlog.conf
    // e ritorna il path del DB configurato.
    //
    // Nel nuovo design, test-mode non è gestito qui ma nel dispatcher.
    //

    if let Some(custom) = &cli.db {
        Config::init_all(Some(custom.clone()), cli.test)?;
    } else {
        Config::init_all(None, cli.test)?;
    }

    let path = Config::config_file();
    // Test mode writes no config file; resolve the --db override directly
    // instead of reading it back through load().
    let db_path = match &cli.db {
        Some(custom) => Config::resolve_db_path(custom)
            .to_string_lossy()
            .to_string(),
        None => Config::load().database,
    };

    println!("⚙️  Initializing fieldlog…");
    println!("📄 Config file : {}", path.display());
    println!("🗄️  Database   : {}", &db_path);

    //
    // 2️⃣ APERTURA DB
    //
    let conn = Connection::open(&db_path)?;

    //
    // 3️⃣ INIZIALIZZAZIONE DB (tabelle + migrazioni)
    //
    init_db(&conn)?;

    println!("✅ Database initialized at {}", &db_path);

    //
    // 4️⃣ LOG INTERNO (non bloccante)
    //
    if let Err(e) = log::oplog(
        &conn,
        "init",
        "database",
        &format!("Database initialized at {}", &db_path),
    ) {
        eprintln!("⚠️ Failed to write internal log: {}", e);
    }

    println!("🎉 fieldlog initialization completed!");
    Ok(())
}
