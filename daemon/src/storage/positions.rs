//! Tailer checkpoints, so a restart resumes after the last delivered line.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::encode_time;
use super::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPosition {
    pub offset: u64,
    pub file_id: Option<String>,
}

pub struct TailPositionRepo;

impl TailPositionRepo {
    pub fn save(
        conn: &Connection,
        path: &str,
        position: &StoredPosition,
        at: DateTime<Utc>,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO tail_positions (path, offset, file_id, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
               offset = excluded.offset,
               file_id = excluded.file_id,
               updated_at = excluded.updated_at",
            params![
                path,
                i64::try_from(position.offset).unwrap_or(i64::MAX),
                position.file_id,
                encode_time(at)
            ],
        )?;
        Ok(())
    }

    pub fn load(conn: &Connection, path: &str) -> Result<Option<StoredPosition>> {
        let position = conn
            .query_row(
                "SELECT offset, file_id FROM tail_positions WHERE path = ?1",
                params![path],
                |row| {
                    let offset: i64 = row.get(0)?;
                    Ok(StoredPosition {
                        offset: u64::try_from(offset).unwrap_or(0),
                        file_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations;

    #[test]
    fn save_overwrites_previous_checkpoint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let now = Utc::now();

        assert!(TailPositionRepo::load(&conn, "/logs/a.log").unwrap().is_none());

        let first = StoredPosition {
            offset: 10,
            file_id: Some("1:2".into()),
        };
        TailPositionRepo::save(&conn, "/logs/a.log", &first, now).unwrap();
        let second = StoredPosition {
            offset: 42,
            file_id: None,
        };
        TailPositionRepo::save(&conn, "/logs/a.log", &second, now).unwrap();

        assert_eq!(
            TailPositionRepo::load(&conn, "/logs/a.log").unwrap(),
            Some(second)
        );
    }
}
