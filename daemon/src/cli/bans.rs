//! `warden bans`: bans in force.

use std::path::Path;

use chrono::Utc;

use crate::error::Error;
use crate::storage::BanRepo;

pub fn run(config_path: Option<&Path>) -> Result<(), Error> {
    let (_, store) = super::open(config_path)?;
    let bans = store.read(|conn| BanRepo::active(conn, Utc::now()))?;

    if bans.is_empty() {
        println!("No active bans");
        return Ok(());
    }
    for ban in &bans {
        let until = ban
            .expires_at
            .map_or_else(|| "permanent".to_string(), super::format_time);
        println!(
            "{}  {}  by {} on {}, until {}",
            ban.player_id,
            ban.reason,
            ban.issued_by,
            super::format_time(ban.issued_at),
            until
        );
    }
    Ok(())
}
