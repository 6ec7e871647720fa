//! Collection repository implementation

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Collection, RecordKey};
use crate::util::iso_timestamp_now;

/// Trait for keyed collection storage operations
pub trait CollectionRepository {
    /// Insert or overwrite a record keyed by its own `id`
    fn upsert(&self, collection: Collection, record: &Value) -> Result<RecordKey>;

    /// All records, in first-insertion order
    fn get_all(&self, collection: Collection) -> Result<Vec<Value>>;

    /// Get a record by key
    fn get(&self, collection: Collection, key: &RecordKey) -> Result<Option<Value>>;

    /// Delete a record; returns whether it existed
    fn remove(&self, collection: Collection, key: &RecordKey) -> Result<bool>;

    /// Delete every record; returns how many were removed
    fn clear(&self, collection: Collection) -> Result<usize>;

    /// Number of records in the collection
    fn count(&self, collection: Collection) -> Result<usize>;
}

/// `SQLite` implementation of `CollectionRepository`
pub struct SqliteCollectionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCollectionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_body(raw: &str) -> Result<Value> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl CollectionRepository for SqliteCollectionRepository<'_> {
    fn upsert(&self, collection: Collection, record: &Value) -> Result<RecordKey> {
        let key = RecordKey::from_record(record)?;
        let body = serde_json::to_string(record)?;

        self.conn.execute(
            &format!(
                "INSERT INTO {} (key, body, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                collection.table_name()
            ),
            params![key.as_str(), body, iso_timestamp_now()],
        )?;

        Ok(key)
    }

    fn get_all(&self, collection: Collection) -> Result<Vec<Value>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT body FROM {} ORDER BY rowid",
            collection.table_name()
        ))?;

        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        bodies.iter().map(|body| Self::parse_body(body)).collect()
    }

    fn get(&self, collection: Collection, key: &RecordKey) -> Result<Option<Value>> {
        let body: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT body FROM {} WHERE key = ?", collection.table_name()),
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        body.as_deref().map(Self::parse_body).transpose()
    }

    fn remove(&self, collection: Collection, key: &RecordKey) -> Result<bool> {
        let rows = self.conn.execute(
            &format!("DELETE FROM {} WHERE key = ?", collection.table_name()),
            params![key.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn clear(&self, collection: Collection) -> Result<usize> {
        let rows = self
            .conn
            .execute(&format!("DELETE FROM {}", collection.table_name()), [])?;
        Ok(rows)
    }

    fn count(&self, collection: Collection) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
