//! Warden - live log monitoring and remote administration for game servers.
//!
//! Tails the server log into a session ledger and sends admin commands over
//! RCON. Single binary, local SQLite.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info_span, Instrument};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod config;
mod dispatch;
mod error;
mod model;
mod monitor;
mod notifications;
mod rcon;
mod storage;
mod watcher;

pub use error::Error;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - live log monitoring and remote administration for game servers")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.warden/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Tail the log, track sessions and accept admin commands on stdin
    Run {
        /// Also write notifications to stdout as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show configuration and ledger summary
    Status,

    /// Show a player's sessions
    History {
        player: String,

        /// Start of range (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// End of range, exclusive
        #[arg(long)]
        until: Option<String>,
    },

    /// List active bans
    Bans,

    /// List recent admin actions
    Actions {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Send one raw RCON command and print the response
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Close sessions left open by a crash
    Reconcile,
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_filter = if cli.verbose { "warden=debug" } else { "warden=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let run_id = uuid::Uuid::new_v4();
    let span = info_span!("warden", run_id = %run_id);
    let _entered = span.enter();

    let config_path = cli.config.as_deref();
    match cli.command {
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
        Some(Commands::Run { json }) => {
            let rt = tokio::runtime::Runtime::new()?;
            let result = rt.block_on(cli::daemon::run(cli.config.clone(), json).instrument(span.clone()));
            // The console's stdin reader never finishes on its own.
            rt.shutdown_timeout(Duration::from_secs(1));
            result?;
        }
        Some(Commands::Status) => {
            let exit_code = cli::status::run(config_path)?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Some(Commands::History {
            player,
            since,
            until,
        }) => {
            cli::history::run(config_path, &player, since.as_deref(), until.as_deref())?;
        }
        Some(Commands::Bans) => {
            cli::bans::run(config_path)?;
        }
        Some(Commands::Actions { limit }) => {
            cli::actions::run(config_path, limit)?;
        }
        Some(Commands::Exec { command }) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::exec::run(config_path, &command.join(" ")))?;
        }
        Some(Commands::Reconcile) => {
            cli::reconcile::run(config_path)?;
        }
    }

    Ok(())
}
