//! `warden history <player>`: a player's sessions.

use std::path::Path;

use chrono::Utc;

use crate::error::Error;
use crate::model::{PlayerId, TimeRange};
use crate::storage::{BanRepo, PlayerRepo, SessionRepo};

pub fn run(
    config_path: Option<&Path>,
    player: &str,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<(), Error> {
    let range = TimeRange {
        since: since.map(super::parse_time).transpose()?,
        until: until.map(super::parse_time).transpose()?,
    };
    let (_, store) = super::open(config_path)?;
    let player = PlayerId::from(player);

    let (identity, sessions, bans) = store.read(|conn| {
        Ok((
            PlayerRepo::get(conn, &player)?,
            SessionRepo::history(conn, &player, range)?,
            BanRepo::list_for(conn, &player)?,
        ))
    })?;

    let Some(identity) = identity else {
        println!("No record of player {}", player);
        return Ok(());
    };

    println!("{} ({})", identity.display_name, identity.id);
    println!("  First seen: {}", super::format_time(identity.first_seen));
    println!("  Last seen: {}", super::format_time(identity.last_seen));
    println!(
        "  Playtime: {}",
        super::format_duration(chrono::Duration::seconds(identity.total_playtime_secs))
    );

    let now = Utc::now();
    for ban in bans.iter().filter(|b| b.is_active_at(now)) {
        let until = ban
            .expires_at
            .map_or_else(|| "permanent".to_string(), super::format_time);
        println!("  Banned: {} (by {}, until {})", ban.reason, ban.issued_by, until);
    }

    if sessions.is_empty() {
        println!("  No sessions in range");
        return Ok(());
    }
    println!("  Sessions:");
    for session in &sessions {
        let end = match session.disconnect_time {
            Some(end) => format!(
                "{}  {}",
                super::format_time(end),
                super::format_duration(end - session.connect_time)
            ),
            None => "online".to_string(),
        };
        let mut notes = Vec::new();
        if let Some(ip) = &session.ip {
            notes.push(ip.clone());
        }
        if let Some(reason) = &session.end_reason {
            notes.push(reason.clone());
        }
        if session.abnormal {
            notes.push("abnormal".into());
        }
        println!(
            "    {} -> {}  {}",
            super::format_time(session.connect_time),
            end,
            notes.join(", ")
        );
    }
    Ok(())
}
