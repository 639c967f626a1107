//! Show Warden status: configuration and ledger summary.

use std::path::Path;

use chrono::Utc;

use crate::config::{self, Config};
use crate::error::Error;
use crate::storage::migrations;
use crate::storage::{AdminActionRepo, BanRepo, PlayerRepo, SessionRepo, Store, TailPositionRepo};

/// Exit codes for status command.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const NO_DATABASE: i32 = 1;
    pub const NO_LOG: i32 = 2;
}

/// Run the status command.
pub fn run(config_path: Option<&Path>) -> Result<i32, Error> {
    let config = Config::load(config_path)?;

    println!("Warden Status");

    match config_path {
        Some(path) => println!("  Config: {}", path.display()),
        None => match config::default_config_path() {
            Ok(path) if path.exists() => println!("  Config: {}", path.display()),
            _ => println!("  Config: defaults"),
        },
    }
    println!(
        "  RCON: {}:{}{}",
        config.rcon.host,
        config.rcon.port,
        if config.rcon.password.is_empty() { " (no password)" } else { "" }
    );

    let log_ok = match &config.log.path {
        Some(path) => {
            let exists = path.exists();
            println!(
                "  Log: {} ({})",
                path.display(),
                if exists { "present" } else { "missing" }
            );
            exists
        }
        None => {
            println!("  Log: not configured");
            false
        }
    };

    let db_path = config.database_path()?;
    if !db_path.exists() {
        println!("  Database: {} (not created yet)", db_path.display());
        println!();
        println!("Run 'warden run' to start recording.");
        return Ok(exit_code::NO_DATABASE);
    }
    println!("  Database: {}", db_path.display());

    let store = Store::open(&db_path)?;
    let now = Utc::now();
    let (schema, players, open, bans, actions, checkpoint) = store.read(|conn| {
        let checkpoint = match &config.log.path {
            Some(path) => TailPositionRepo::load(conn, &path.to_string_lossy())?,
            None => None,
        };
        Ok((
            migrations::current_version(conn)?,
            PlayerRepo::list(conn)?.len(),
            SessionRepo::list_open(conn)?,
            BanRepo::active(conn, now)?.len(),
            AdminActionRepo::count(conn)?,
            checkpoint,
        ))
    })?;

    println!("  Schema: v{} (latest v{})", schema, migrations::latest_version());
    println!("  Players seen: {}", players);
    println!("  Open sessions: {}", open.len());
    for session in &open {
        println!(
            "    {} since {}",
            session.player_id,
            super::format_time(session.connect_time)
        );
    }
    println!("  Active bans: {}", bans);
    println!("  Admin actions: {}", actions);
    if let Some(position) = checkpoint {
        println!("  Log checkpoint: byte {}", position.offset);
    }

    if !log_ok {
        println!();
        println!("Set log.path in the config or WARDEN_LOG_PATH.");
        return Ok(exit_code::NO_LOG);
    }

    Ok(exit_code::OK)
}
