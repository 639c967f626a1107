//! Append-only log of admin commands the server acknowledged.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::error::{Result, StoreError};
use super::{encode_time, time_at};
use crate::model::{AdminActionRecord, AdminActionType, PlayerId};

pub struct AdminActionRepo;

impl AdminActionRepo {
    pub fn append(
        conn: &Connection,
        action: AdminActionType,
        target: &PlayerId,
        issued_by: &str,
        timestamp: DateTime<Utc>,
        result: &str,
    ) -> Result<AdminActionRecord> {
        conn.execute(
            "INSERT INTO admin_actions (type, target, issued_by, timestamp, result)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                action.as_str(),
                target.as_str(),
                issued_by,
                encode_time(timestamp),
                result
            ],
        )?;
        Ok(AdminActionRecord {
            id: conn.last_insert_rowid(),
            action,
            target: target.clone(),
            issued_by: issued_by.to_string(),
            timestamp,
            result: result.to_string(),
        })
    }

    /// Most recent actions first.
    pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<AdminActionRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, type, target, issued_by, timestamp, result
             FROM admin_actions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM admin_actions", [], |row| row.get(0))?)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Result<AdminActionRecord>> {
        let kind: String = row.get(1)?;
        let Some(action) = AdminActionType::parse(&kind) else {
            return Ok(Err(StoreError::Corrupted(format!(
                "unknown admin action type {kind:?}"
            ))));
        };
        Ok(Ok(AdminActionRecord {
            id: row.get(0)?,
            action,
            target: PlayerId::new(row.get::<_, String>(2)?),
            issued_by: row.get(3)?,
            timestamp: time_at(row, 4)?,
            result: row.get(5)?,
        }))
    }
}
