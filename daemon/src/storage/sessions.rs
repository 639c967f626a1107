//! Session records: one row per continuous connected interval.
//!
//! `(player_id, connect_time)` is unique, and a partial index allows at most one
//! open row (`disconnect_time IS NULL`) per player.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::error::{Result, StoreError};
use super::{encode_time, opt_time_at, time_at, PlayerRepo};
use crate::model::{PlayerId, SessionRecord, TimeRange};

const COLUMNS: &str =
    "id, player_id, connect_time, disconnect_time, ip, abnormal, end_reason";

pub struct SessionRepo;

impl SessionRepo {
    /// Insert an open session. The player row must already exist.
    pub fn insert_open(
        conn: &Connection,
        player_id: &PlayerId,
        connect_time: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO sessions (player_id, connect_time, ip) VALUES (?1, ?2, ?3)",
            params![player_id.as_str(), encode_time(connect_time), ip],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Close an open session and credit its duration to the player.
    pub fn close(
        conn: &Connection,
        id: i64,
        disconnect_time: DateTime<Utc>,
        abnormal: bool,
        reason: &str,
    ) -> Result<SessionRecord> {
        let changed = conn.execute(
            "UPDATE sessions SET disconnect_time = ?1, abnormal = ?2, end_reason = ?3
             WHERE id = ?4 AND disconnect_time IS NULL",
            params![encode_time(disconnect_time), abnormal, reason, id],
        )?;
        if changed == 0 {
            return Err(StoreError::Integrity(format!(
                "session {id} is not open"
            )));
        }

        let record = Self::get(conn, id)?
            .ok_or_else(|| StoreError::Integrity(format!("session {id} vanished")))?;
        if let Some(duration) = record.duration() {
            PlayerRepo::add_playtime(conn, &record.player_id, duration.num_seconds())?;
        }
        Ok(record)
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<SessionRecord>> {
        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn find_by_key(
        conn: &Connection,
        player_id: &PlayerId,
        connect_time: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>> {
        let record = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM sessions WHERE player_id = ?1 AND connect_time = ?2"
                ),
                params![player_id.as_str(), encode_time(connect_time)],
                Self::map_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn find_open(conn: &Connection, player_id: &PlayerId) -> Result<Option<SessionRecord>> {
        let record = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM sessions
                     WHERE player_id = ?1 AND disconnect_time IS NULL"
                ),
                params![player_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_open(conn: &Connection) -> Result<Vec<SessionRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sessions WHERE disconnect_time IS NULL
             ORDER BY connect_time, player_id"
        ))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sessions for `player_id` that overlap `range`, oldest first.
    pub fn history(
        conn: &Connection,
        player_id: &PlayerId,
        range: TimeRange,
    ) -> Result<Vec<SessionRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE player_id = ?1
               AND (?2 IS NULL OR disconnect_time IS NULL OR disconnect_time >= ?2)
               AND (?3 IS NULL OR connect_time < ?3)
             ORDER BY connect_time"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    player_id.as_str(),
                    range.since.map(encode_time),
                    range.until.map(encode_time)
                ],
                Self::map_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    #[cfg(test)]
    pub fn count_closed(conn: &Connection, player_id: &PlayerId) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE player_id = ?1 AND disconnect_time IS NOT NULL",
            params![player_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
        Ok(SessionRecord {
            id: row.get(0)?,
            player_id: PlayerId::new(row.get::<_, String>(1)?),
            connect_time: time_at(row, 2)?,
            disconnect_time: opt_time_at(row, 3)?,
            ip: row.get(4)?,
            abnormal: row.get(5)?,
            end_reason: row.get(6)?,
        })
    }
}
