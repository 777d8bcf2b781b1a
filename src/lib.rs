//! fieldlog library root.
//! Exposes CLI parser, high-level run() function, and internal modules.

pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod errors;
pub mod models;
pub mod platform;
pub mod sync;
pub mod ui;
pub mod utils;

use clap::Parser;
use cli::parser::{Cli, Commands};
use config::Config;
use errors::AppResult;

/// Central command dispatcher
pub fn dispatch(cli: &Cli, cfg: &Config) -> AppResult<()> {
    match &cli.command {
        Commands::Init => cli::commands::init::handle(cli),
        Commands::Config { .. } => cli::commands::config::handle(&cli.command, cfg),
        Commands::Db { .. } => cli::commands::db::handle(&cli.command, cfg),
        Commands::Log { .. } => cli::commands::log::handle(&cli.command, cfg),
        Commands::Track { .. } => cli::commands::track::handle(&cli.command, cfg),
        Commands::Heartbeat { .. } => cli::commands::heartbeat::handle(&cli.command, cfg),
        Commands::Recover { .. } => cli::commands::recover::handle(&cli.command, cfg),
        Commands::Status => cli::commands::status::handle(&cli.command, cfg),
        Commands::List { .. } => cli::commands::list::handle(&cli.command, cfg),
        Commands::Edit { .. } => cli::commands::edit::handle(&cli.command, cfg),
        Commands::Del { .. } => cli::commands::del::handle(&cli.command, cfg),
        Commands::Pause { .. } => cli::commands::pause::handle(&cli.command, cfg),
        Commands::Resume { .. } => cli::commands::resume::handle(&cli.command, cfg),
        Commands::Absence { .. } => cli::commands::absence::handle(&cli.command, cfg),
        Commands::Fence { .. } => cli::commands::fence::handle(&cli.command, cfg),
        Commands::Summary { .. } => cli::commands::summary::handle(&cli.command, cfg),
        Commands::Sync { .. } => cli::commands::sync::handle(&cli.command, cfg),
        Commands::Queue { .. } => cli::commands::queue::handle(&cli.command, cfg),
        Commands::Ai { .. } => cli::commands::ai::handle(&cli.command, cfg),
        Commands::Undo { .. } => cli::commands::undo::handle(&cli.command, cfg),
        Commands::Voice { .. } => cli::commands::voice::handle(&cli.command, cfg),
    }
}

/// Entry point usato da main.rs
pub fn run() -> AppResult<()> {
    // 1️⃣ parse CLI
    let cli = Cli::parse();

    // 2️⃣ carica config UNA sola volta
    let mut cfg = Config::load();

    // 3️⃣ applica eventuale override del DB da riga di comando
    if let Some(custom_db) = &cli.db {
        cfg.database = custom_db.clone();
    }

    // (per ora `cli.test` lo ignoriamo qui; lo usi solo dove serve davvero)

    // 4️⃣ passa tutto al dispatcher
    dispatch(&cli, &cfg)
}
