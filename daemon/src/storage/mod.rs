//! Durable ledger of players, sessions, bans, and admin actions.
//!
//! One `SQLite` connection sits behind a mutex: every writer in the process
//! (session tracking, command dispatch, tail checkpoints) funnels through
//! [`Store::write`], which runs the closure inside a transaction. Readers never
//! observe a half-written record.
//!
//! Repositories are stateless: each method takes `&Connection` and executes
//! SQL, so several of them compose inside one `write` call.

pub mod actions;
pub mod bans;
pub mod error;
pub mod migrations;
pub mod players;
pub mod positions;
pub mod sessions;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, Transaction};
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::SessionRecord;

pub use actions::AdminActionRepo;
pub use bans::BanRepo;
pub use error::{Result, StoreError};
pub use players::PlayerRepo;
pub use positions::{StoredPosition, TailPositionRepo};
pub use sessions::SessionRepo;

/// Where the closing timestamp of a session left open by a crash comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcilePolicy {
    /// Last event timestamp observed for the player before shutdown.
    #[default]
    LastSeen,
    /// Wall-clock time of the reconciling process start.
    WallClock,
}

/// Handle to the ledger database. Open once per process.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a file-backed store and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;
        migrations::run_migrations(&conn)?;
        info!(path = %path.display(), "Opened ledger");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Close every session left open by an unclean shutdown.
    ///
    /// Must run before the tailer resumes. Returns the records it closed.
    pub fn reconcile(&self, policy: ReconcilePolicy, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let closed = self.write(|tx| {
            let open = SessionRepo::list_open(tx)?;
            let mut closed = Vec::with_capacity(open.len());
            for session in open {
                let end = match policy {
                    ReconcilePolicy::LastSeen => PlayerRepo::last_seen(tx, &session.player_id)?
                        .unwrap_or(session.connect_time),
                    ReconcilePolicy::WallClock => now,
                };
                let end = end.max(session.connect_time);
                closed.push(SessionRepo::close(tx, session.id, end, true, "reconciled")?);
            }
            Ok(closed)
        })?;

        for record in &closed {
            warn!(
                player = %record.player_id,
                session = record.id,
                disconnect_time = ?record.disconnect_time,
                "Closed session left open by previous run"
            );
        }
        Ok(closed)
    }
}

pub(crate) fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_time(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

pub(crate) fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode_time(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn opt_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        decode_time(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayerId;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
    }

    fn open_session(store: &Store, id: &str, start: DateTime<Utc>) -> i64 {
        let player = PlayerId::from(id);
        store
            .write(|tx| {
                PlayerRepo::upsert_seen(tx, &player, Some("Alice"), start)?;
                SessionRepo::insert_open(tx, &player, start, Some("1.2.3.4"))
            })
            .unwrap()
    }

    #[test]
    fn reconcile_uses_last_seen_time() {
        let store = Store::open_in_memory().unwrap();
        let player = PlayerId::from("P1");
        open_session(&store, "P1", at(12, 0, 1));
        store
            .write(|tx| PlayerRepo::upsert_seen(tx, &player, None, at(12, 3, 0)))
            .unwrap();

        let closed = store
            .reconcile(ReconcilePolicy::LastSeen, at(18, 0, 0))
            .unwrap();

        assert_eq!(closed.len(), 1);
        assert!(closed[0].abnormal);
        assert_eq!(closed[0].disconnect_time, Some(at(12, 3, 0)));
        assert_eq!(closed[0].end_reason.as_deref(), Some("reconciled"));
        assert!(store.read(|c| SessionRepo::list_open(c)).unwrap().is_empty());
    }

    #[test]
    fn reconcile_wall_clock_policy() {
        let store = Store::open_in_memory().unwrap();
        open_session(&store, "P1", at(12, 0, 1));

        let closed = store
            .reconcile(ReconcilePolicy::WallClock, at(18, 0, 0))
            .unwrap();

        assert_eq!(closed[0].disconnect_time, Some(at(18, 0, 0)));
    }

    #[test]
    fn reconcile_with_nothing_open_is_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store
            .reconcile(ReconcilePolicy::LastSeen, at(1, 0, 0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn failed_write_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let player = PlayerId::from("P1");
        let result: Result<()> = store.write(|tx| {
            PlayerRepo::upsert_seen(tx, &player, Some("Alice"), at(1, 0, 0))?;
            Err(StoreError::Integrity("forced".into()))
        });
        assert!(result.is_err());
        assert!(store.read(|c| PlayerRepo::get(c, &player)).unwrap().is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        {
            let store = Store::open(&path).unwrap();
            open_session(&store, "P1", at(12, 0, 1));
        }
        let store = Store::open(&path).unwrap();
        let open = store.read(|c| SessionRepo::list_open(c)).unwrap();
        assert_eq!(open.len(), 1);
        assert!(path.exists());
    }

    #[test]
    fn time_encoding_sorts_chronologically() {
        let earlier = encode_time(at(9, 59, 59));
        let later = encode_time(at(10, 0, 0));
        assert!(earlier < later);
        assert_eq!(decode_time(&later).unwrap(), at(10, 0, 0));
    }
}
