//! `warden exec <command>`: one raw RCON command, response to stdout.

use std::path::Path;

use tokio::sync::watch;

use crate::config::Config;
use crate::error::Error;
use crate::rcon::RconClient;

pub async fn run(config_path: Option<&Path>, command: &str) -> Result<(), Error> {
    let config = Config::load(config_path)?;
    let (_credentials, credentials_rx) = watch::channel(config.credentials());
    let (rcon, worker) = RconClient::spawn(credentials_rx, config.client_options());

    let response = rcon.execute(command).await;
    worker.abort();

    let response = response?;
    if response.is_empty() {
        println!("(empty response)");
    } else {
        println!("{}", response.trim_end());
    }
    Ok(())
}
