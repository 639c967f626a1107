//! `warden run`: tail the log, track sessions and take admin commands.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::cli::console;
use crate::config::{self, Config};
use crate::dispatch::CommandDispatcher;
use crate::error::Error;
use crate::monitor::Monitor;
use crate::notifications::{Fanout, JsonLinesSink, NotificationSink, TracingSink};
use crate::rcon::RconClient;
use crate::storage::Store;
use crate::watcher::FileTailer;

/// Run until interrupted or `quit` is typed on the console.
///
/// With `json`, notifications are also written to stdout as JSON lines and
/// console replies move to stderr.
pub async fn run(config_path: Option<PathBuf>, json: bool) -> Result<(), Error> {
    let config = Config::load(config_path.as_deref())?;
    let log_path = config.log.path.clone().ok_or_else(|| {
        Error::InvalidArgument("no log file configured (set log.path or WARDEN_LOG_PATH)".into())
    })?;
    let store = Arc::new(Store::open(&config.database_path()?)?);

    let (credentials_tx, credentials_rx) = watch::channel(config.credentials());
    let (rcon, worker) = RconClient::spawn(credentials_rx, config.client_options());
    let warmup = rcon.clone();
    tokio::spawn(async move {
        if let Err(e) = warmup.connect().await {
            warn!(error = %e, "RCON not available yet; commands will retry");
        }
    });
    let dispatcher = CommandDispatcher::new(
        rcon,
        store.clone(),
        config.commands.templates.clone(),
        config.issued_by(),
    );

    let sink: Box<dyn NotificationSink> = if json {
        Box::new(Fanout(vec![
            Box::new(TracingSink),
            Box::new(JsonLinesSink::new(io::stdout())),
        ]))
    } else {
        Box::new(TracingSink)
    };

    let mut monitor = Monitor::new(
        FileTailer::open(&log_path, config.tail_config()),
        store,
        dispatcher,
        sink,
        config.poll_interval(),
    )
    .with_reload(config_path.clone(), credentials_tx);
    monitor.start(config.reconcile.policy, Utc::now())?;

    let (reload_tx, reload_rx) = mpsc::channel(1);
    let watch_path = match config_path {
        Some(path) => Some(path),
        None => config::default_config_path().ok(),
    };
    // Dropping the debouncer stops the watch.
    let _watcher = match watch_path {
        Some(path) => config::watch(&path, reload_tx)
            .inspect_err(|e| warn!(error = %e, "Config hot reload disabled"))
            .ok(),
        None => None,
    };

    let (requests_tx, requests_rx) = mpsc::channel(16);
    let (quit_tx, quit_rx) = oneshot::channel();
    tokio::spawn(console::run(requests_tx, quit_tx, json));

    info!(log = %log_path.display(), "Warden running; type 'help' for commands");
    monitor.run(requests_rx, reload_rx, shutdown(quit_rx)).await;
    worker.abort();
    Ok(())
}

async fn shutdown(quit: oneshot::Receiver<()>) {
    let quit = async {
        // A console that hit end of input never asks to quit.
        if quit.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => warn!(error = %e, "Signal handler failed, shutting down"),
        },
        () = quit => info!("Quit requested, shutting down"),
    }
}
