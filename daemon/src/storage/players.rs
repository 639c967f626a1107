//! Player identities: upserted on every event that names a player.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::error::Result;
use super::{encode_time, time_at};
use crate::model::{PlayerId, PlayerIdentity};

pub struct PlayerRepo;

impl PlayerRepo {
    /// Insert the player if unknown, otherwise refresh name and `last_seen`.
    ///
    /// `last_seen` only moves forward, so replaying older lines never rewinds it.
    pub fn upsert_seen(
        conn: &Connection,
        id: &PlayerId,
        display_name: Option<&str>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO players (id, first_seen, display_name, last_seen)
             VALUES (?1, ?2, COALESCE(?3, ?1), ?2)
             ON CONFLICT(id) DO UPDATE SET
               display_name = COALESCE(?3, display_name),
               first_seen   = MIN(first_seen, excluded.first_seen),
               last_seen    = MAX(last_seen, excluded.last_seen)",
            params![id.as_str(), encode_time(seen_at), display_name],
        )?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &PlayerId) -> Result<Option<PlayerIdentity>> {
        let player = conn
            .query_row(
                "SELECT id, display_name, first_seen, last_seen, total_playtime_secs
                 FROM players WHERE id = ?1",
                params![id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(player)
    }

    pub fn last_seen(conn: &Connection, id: &PlayerId) -> Result<Option<DateTime<Utc>>> {
        let seen = conn
            .query_row(
                "SELECT last_seen FROM players WHERE id = ?1",
                params![id.as_str()],
                |row| time_at(row, 0),
            )
            .optional()?;
        Ok(seen)
    }

    pub fn add_playtime(conn: &Connection, id: &PlayerId, secs: i64) -> Result<()> {
        conn.execute(
            "UPDATE players SET total_playtime_secs = total_playtime_secs + ?1 WHERE id = ?2",
            params![secs.max(0), id.as_str()],
        )?;
        Ok(())
    }

    pub fn list(conn: &Connection) -> Result<Vec<PlayerIdentity>> {
        let mut stmt = conn.prepare(
            "SELECT id, display_name, first_seen, last_seen, total_playtime_secs
             FROM players ORDER BY last_seen DESC",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<PlayerIdentity> {
        Ok(PlayerIdentity {
            id: PlayerId::new(row.get::<_, String>(0)?),
            display_name: row.get(1)?,
            first_seen: time_at(row, 2)?,
            last_seen: time_at(row, 3)?,
            total_playtime_secs: row.get(4)?,
        })
    }
}
