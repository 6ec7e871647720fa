//! Sync metadata repository (singleton records such as the watermark)

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::SyncWatermark;

/// Well-known key of the last-pull watermark
pub const WATERMARK_KEY: &str = "lastSync";

/// `SQLite` access to the `sync_meta` table
pub struct SqliteSyncMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncMetaRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Load the watermark, if any pull has completed
    pub fn watermark(&self) -> Result<Option<SyncWatermark>> {
        Ok(self
            .get_value(WATERMARK_KEY)?
            .map(|timestamp| SyncWatermark { timestamp }))
    }

    /// Overwrite the watermark
    pub fn set_watermark(&self, timestamp: &str) -> Result<()> {
        self.set_value(WATERMARK_KEY, timestamp)
    }

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_watermark_absent_by_default() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSyncMetaRepository::new(db.connection());
        assert!(repo.watermark().unwrap().is_none());
    }

    #[test]
    fn test_watermark_is_overwritten() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSyncMetaRepository::new(db.connection());

        repo.set_watermark("2025-01-01T00:00:00Z").unwrap();
        repo.set_watermark("2025-02-01T00:00:00Z").unwrap();

        assert_eq!(
            repo.watermark().unwrap().unwrap().timestamp,
            "2025-02-01T00:00:00Z"
        );
    }
}
