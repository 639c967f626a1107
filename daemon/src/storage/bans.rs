//! Ban records, unique per `(player_id, issued_at)`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::error::Result;
use super::{encode_time, opt_time_at, time_at};
use crate::model::{BanRecord, PlayerId};

pub struct BanRepo;

impl BanRepo {
    pub fn insert(conn: &Connection, ban: &BanRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO bans (player_id, reason, issued_by, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ban.player_id.as_str(),
                ban.reason,
                ban.issued_by,
                encode_time(ban.issued_at),
                ban.expires_at.map(encode_time),
            ],
        )?;
        Ok(())
    }

    pub fn list_for(conn: &Connection, player_id: &PlayerId) -> Result<Vec<BanRecord>> {
        let mut stmt = conn.prepare(
            "SELECT player_id, reason, issued_by, issued_at, expires_at
             FROM bans WHERE player_id = ?1 ORDER BY issued_at",
        )?;
        let rows = stmt
            .query_map(params![player_id.as_str()], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Bans that have not expired at `at`, newest first.
    pub fn active(conn: &Connection, at: DateTime<Utc>) -> Result<Vec<BanRecord>> {
        let mut stmt = conn.prepare(
            "SELECT player_id, reason, issued_by, issued_at, expires_at
             FROM bans WHERE expires_at IS NULL OR expires_at > ?1
             ORDER BY issued_at DESC",
        )?;
        let rows = stmt
            .query_map(params![encode_time(at)], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<BanRecord> {
        Ok(BanRecord {
            player_id: PlayerId::new(row.get::<_, String>(0)?),
            reason: row.get(1)?,
            issued_by: row.get(2)?,
            issued_at: time_at(row, 3)?,
            expires_at: opt_time_at(row, 4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations;
    use chrono::TimeZone;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn ban(id: &str, issued_at: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> BanRecord {
        BanRecord {
            player_id: PlayerId::from(id),
            reason: "griefing".into(),
            issued_by: "admin".into(),
            issued_at,
            expires_at,
        }
    }

    #[test]
    fn duplicate_issue_time_is_rejected() {
        let conn = setup();
        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        BanRepo::insert(&conn, &ban("P1", issued, None)).unwrap();
        assert!(BanRepo::insert(&conn, &ban("P1", issued, None))
            .unwrap_err()
            .is_integrity());
        // A different player at the same instant is fine.
        BanRepo::insert(&conn, &ban("P2", issued, None)).unwrap();
    }

    #[test]
    fn offline_identity_can_be_banned() {
        let conn = setup();
        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        BanRepo::insert(&conn, &ban("never-seen", issued, None)).unwrap();
        assert_eq!(
            BanRepo::list_for(&conn, &PlayerId::from("never-seen"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn active_excludes_expired() {
        let conn = setup();
        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        BanRepo::insert(&conn, &ban("P1", issued, None)).unwrap();
        BanRepo::insert(
            &conn,
            &ban("P2", issued, Some(issued + chrono::Duration::hours(1))),
        )
        .unwrap();

        let now = issued + chrono::Duration::hours(2);
        let active = BanRepo::active(&conn, now).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].player_id, PlayerId::from("P1"));
        assert!(active[0].is_active_at(now));
    }
}
