//! `warden actions`: recent admin actions, newest first.

use std::path::Path;

use crate::error::Error;
use crate::storage::AdminActionRepo;

pub fn run(config_path: Option<&Path>, limit: usize) -> Result<(), Error> {
    let (_, store) = super::open(config_path)?;
    let actions = store.read(|conn| AdminActionRepo::list_recent(conn, limit))?;

    if actions.is_empty() {
        println!("No admin actions recorded");
        return Ok(());
    }
    for action in &actions {
        println!(
            "{}  {:<8} {}  by {}  {}",
            super::format_time(action.timestamp),
            action.action,
            action.target,
            action.issued_by,
            action.result
        );
    }
    Ok(())
}
