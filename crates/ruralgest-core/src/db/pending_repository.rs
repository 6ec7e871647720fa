//! Pending mutation queue and dead-letter storage

use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{DeadLetter, MutationPayload, PendingMutation};
use crate::util::iso_timestamp_now;

/// Trait for pending mutation queue operations
pub trait PendingRepository {
    /// Append a mutation to the tail of the queue
    fn enqueue(&self, action: &str, payload: &MutationPayload) -> Result<PendingMutation>;

    /// All queued mutations, oldest first
    fn list(&self) -> Result<Vec<PendingMutation>>;

    /// Number of queued mutations
    fn count(&self) -> Result<usize>;

    /// Remove one mutation; returns whether it was queued
    fn remove(&self, id: i64) -> Result<bool>;

    /// Remove every queued mutation
    fn clear(&self) -> Result<usize>;

    /// Bump the attempt counter of a mutation that stays queued
    fn record_failure(&self, id: i64) -> Result<()>;

    /// Move a mutation out of the queue into the dead-letter table
    fn dead_letter(&self, id: i64, error: &str) -> Result<()>;

    /// Dead letters, oldest first
    fn list_dead(&self) -> Result<Vec<DeadLetter>>;

    /// Move every dead letter back to the tail of the queue, preserving order
    fn requeue_dead(&self) -> Result<usize>;

    /// Drop every dead letter
    fn clear_dead(&self) -> Result<usize>;
}

/// `SQLite` implementation of `PendingRepository`
pub struct SqlitePendingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePendingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_pending(row: &Row<'_>) -> rusqlite::Result<(PendingMutation, String)> {
        let body: String = row.get(3)?;
        Ok((
            PendingMutation {
                id: row.get(0)?,
                action: row.get(1)?,
                payload: MutationPayload {
                    endpoint: row.get(2)?,
                    body: serde_json::Value::Null,
                },
                created_at: row.get(4)?,
                attempts: row.get(5)?,
            },
            body,
        ))
    }

    fn parse_dead(row: &Row<'_>) -> rusqlite::Result<(DeadLetter, String)> {
        let body: String = row.get(3)?;
        Ok((
            DeadLetter {
                id: row.get(0)?,
                action: row.get(1)?,
                payload: MutationPayload {
                    endpoint: row.get(2)?,
                    body: serde_json::Value::Null,
                },
                created_at: row.get(4)?,
                attempts: row.get(5)?,
                failed_at: row.get(6)?,
                error: row.get(7)?,
            },
            body,
        ))
    }
}

impl PendingRepository for SqlitePendingRepository<'_> {
    fn enqueue(&self, action: &str, payload: &MutationPayload) -> Result<PendingMutation> {
        let action = action.trim();
        if action.is_empty() {
            return Err(Error::InvalidInput("action must not be empty".into()));
        }
        if payload.endpoint.trim().is_empty() {
            return Err(Error::InvalidInput("endpoint must not be empty".into()));
        }

        let created_at = iso_timestamp_now();
        self.conn.execute(
            "INSERT INTO pending_sync (action, endpoint, body, created_at, attempts)
             VALUES (?, ?, ?, ?, 0)",
            params![
                action,
                payload.endpoint,
                serde_json::to_string(&payload.body)?,
                created_at
            ],
        )?;

        Ok(PendingMutation {
            id: self.conn.last_insert_rowid(),
            action: action.to_string(),
            payload: payload.clone(),
            created_at,
            attempts: 0,
        })
    }

    fn list(&self) -> Result<Vec<PendingMutation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action, endpoint, body, created_at, attempts
             FROM pending_sync
             ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map([], Self::parse_pending)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut entry, body)| -> Result<PendingMutation> {
                entry.payload.body = serde_json::from_str(&body)?;
                Ok(entry)
            })
            .collect()
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending_sync", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn remove(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM pending_sync WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM pending_sync", [])?)
    }

    fn record_failure(&self, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE pending_sync SET attempts = attempts + 1 WHERE id = ?",
            params![id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("pending mutation {id}")));
        }
        Ok(())
    }

    fn dead_letter(&self, id: i64, error: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let moved = tx.execute(
            "INSERT INTO pending_sync_dead
                (id, action, endpoint, body, created_at, attempts, failed_at, error)
             SELECT id, action, endpoint, body, created_at, attempts + 1, ?, ?
             FROM pending_sync WHERE id = ?",
            params![iso_timestamp_now(), error, id],
        )?;
        if moved == 0 {
            return Err(Error::NotFound(format!("pending mutation {id}")));
        }
        tx.execute("DELETE FROM pending_sync WHERE id = ?", params![id])?;
        tx.commit()?;
        Ok(())
    }

    fn list_dead(&self) -> Result<Vec<DeadLetter>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action, endpoint, body, created_at, attempts, failed_at, error
             FROM pending_sync_dead
             ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map([], Self::parse_dead)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut entry, body)| -> Result<DeadLetter> {
                entry.payload.body = serde_json::from_str(&body)?;
                Ok(entry)
            })
            .collect()
    }

    fn requeue_dead(&self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let moved = tx.execute(
            "INSERT INTO pending_sync (action, endpoint, body, created_at, attempts)
             SELECT action, endpoint, body, created_at, 0
             FROM pending_sync_dead
             ORDER BY id ASC",
            [],
        )?;
        tx.execute("DELETE FROM pending_sync_dead", [])?;
        tx.commit()?;
        Ok(moved)
    }

    fn clear_dead(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM pending_sync_dead", [])?)
    }
}
