//! `warden reconcile`: close sessions left open by a crash without starting
//! the daemon.

use std::path::Path;

use chrono::Utc;

use crate::error::Error;

pub fn run(config_path: Option<&Path>) -> Result<(), Error> {
    let (config, store) = super::open(config_path)?;
    let policy = config.reconcile.policy;
    let closed = store.reconcile(policy, Utc::now())?;

    if closed.is_empty() {
        println!("No open sessions");
        return Ok(());
    }
    println!("Closed {} session(s) ({:?}):", closed.len(), policy);
    for session in &closed {
        let end = session
            .disconnect_time
            .map(super::format_time)
            .unwrap_or_default();
        println!(
            "  {}  {} -> {}",
            session.player_id,
            super::format_time(session.connect_time),
            end
        );
    }
    Ok(())
}
