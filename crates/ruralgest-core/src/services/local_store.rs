//! Shared local store used by the sync engine, scheduler and clients.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard, OnceCell};

use crate::db::{
    CollectionRepository, Database, PendingRepository, SqliteCollectionRepository,
    SqlitePendingRepository, SqliteSyncMetaRepository, StoreLocation,
};
use crate::error::{Error, Result};
use crate::models::{
    Collection, DeadLetter, MutationPayload, PendingMutation, RecordKey, SyncWatermark,
};

/// Cloneable handle to the local store.
///
/// The underlying database is opened lazily on first use. Concurrent first
/// callers share a single open; a failed open is retried by the next caller.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    location: StoreLocation,
    db: OnceCell<Arc<Mutex<Database>>>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("location", &self.inner.location)
            .field("initialized", &self.inner.db.initialized())
            .finish()
    }
}

impl LocalStore {
    /// Create a store handle; nothing is opened until first use.
    pub fn new(location: StoreLocation) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                location,
                db: OnceCell::new(),
            }),
        }
    }

    /// In-memory store (primarily for tests).
    pub fn in_memory() -> Self {
        Self::new(StoreLocation::Memory)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.inner.location
    }

    /// Open the store (creating and migrating it if absent). Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        self.handle().await.map(|_| ())
    }

    async fn handle(&self) -> Result<&Arc<Mutex<Database>>> {
        self.inner
            .db
            .get_or_try_init(|| async {
                let location = self.inner.location.clone();
                let database = tokio::task::spawn_blocking(move || Database::open_at(&location))
                    .await
                    .map_err(|error| Error::Database(format!("store open task failed: {error}")))??;
                tracing::debug!("Local store ready at {:?}", self.inner.location);
                Ok::<_, Error>(Arc::new(Mutex::new(database)))
            })
            .await
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        Ok(self.handle().await?.lock().await)
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    /// Insert or overwrite a single record keyed by its `id`.
    pub async fn upsert(&self, collection: Collection, record: &Value) -> Result<RecordKey> {
        let db = self.lock().await?;
        SqliteCollectionRepository::new(db.connection()).upsert(collection, record)
    }

    /// Insert or overwrite several records.
    ///
    /// Every record must carry an `id`; nothing is written otherwise. Each
    /// record is then written independently, so a storage failure part-way
    /// leaves the earlier records in place.
    pub async fn upsert_many(&self, collection: Collection, records: &[Value]) -> Result<usize> {
        for record in records {
            RecordKey::from_record(record)?;
        }

        let db = self.lock().await?;
        let repo = SqliteCollectionRepository::new(db.connection());
        for record in records {
            repo.upsert(collection, record)?;
        }
        Ok(records.len())
    }

    /// All records of a collection, in first-insertion order.
    pub async fn get_all(&self, collection: Collection) -> Result<Vec<Value>> {
        let db = self.lock().await?;
        SqliteCollectionRepository::new(db.connection()).get_all(collection)
    }

    /// All records of a collection decoded into a model.
    pub async fn get_all_as<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        self.get_all(collection)
            .await?
            .into_iter()
            .map(|record| -> Result<T> { Ok(serde_json::from_value(record)?) })
            .collect()
    }

    /// Fetch one record by key.
    pub async fn get_by_key(
        &self,
        collection: Collection,
        key: &RecordKey,
    ) -> Result<Option<Value>> {
        let db = self.lock().await?;
        SqliteCollectionRepository::new(db.connection()).get(collection, key)
    }

    /// Fetch one record by key decoded into a model.
    pub async fn get_by_key_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &RecordKey,
    ) -> Result<Option<T>> {
        self.get_by_key(collection, key)
            .await?
            .map(|record| -> Result<T> { Ok(serde_json::from_value(record)?) })
            .transpose()
    }

    /// Delete one record; returns whether it existed.
    pub async fn remove(&self, collection: Collection, key: &RecordKey) -> Result<bool> {
        let db = self.lock().await?;
        SqliteCollectionRepository::new(db.connection()).remove(collection, key)
    }

    /// Delete every record of a collection.
    pub async fn clear(&self, collection: Collection) -> Result<usize> {
        let db = self.lock().await?;
        SqliteCollectionRepository::new(db.connection()).clear(collection)
    }

    pub async fn count(&self, collection: Collection) -> Result<usize> {
        let db = self.lock().await?;
        SqliteCollectionRepository::new(db.connection()).count(collection)
    }

    // -----------------------------------------------------------------------
    // Pending mutations
    // -----------------------------------------------------------------------

    /// Append a local write to the pending queue.
    pub async fn enqueue_pending(
        &self,
        action: &str,
        payload: &MutationPayload,
    ) -> Result<PendingMutation> {
        let db = self.lock().await?;
        let entry = SqlitePendingRepository::new(db.connection()).enqueue(action, payload)?;
        tracing::debug!(
            "Queued pending mutation #{} {} -> {}",
            entry.id,
            entry.action,
            entry.payload.endpoint
        );
        Ok(entry)
    }

    /// Queued mutations in enqueue order.
    pub async fn list_pending(&self) -> Result<Vec<PendingMutation>> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).list()
    }

    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).count()
    }

    /// Empty the pending queue.
    pub async fn clear_pending(&self) -> Result<usize> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).clear()
    }

    /// Remove one settled mutation.
    pub async fn remove_pending(&self, id: i64) -> Result<bool> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).remove(id)
    }

    /// Count a failed replay against a mutation that stays queued.
    pub async fn record_pending_failure(&self, id: i64) -> Result<()> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).record_failure(id)
    }

    /// Move a failed mutation to the dead-letter table.
    pub async fn dead_letter_pending(&self, id: i64, error: &str) -> Result<()> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).dead_letter(id, error)
    }

    pub async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).list_dead()
    }

    /// Put every dead letter back at the tail of the pending queue.
    pub async fn requeue_dead_letters(&self) -> Result<usize> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).requeue_dead()
    }

    pub async fn clear_dead_letters(&self) -> Result<usize> {
        let db = self.lock().await?;
        SqlitePendingRepository::new(db.connection()).clear_dead()
    }

    // -----------------------------------------------------------------------
    // Sync metadata
    // -----------------------------------------------------------------------

    /// Timestamp of the last successful pull, if any.
    pub async fn watermark(&self) -> Result<Option<SyncWatermark>> {
        let db = self.lock().await?;
        SqliteSyncMetaRepository::new(db.connection()).watermark()
    }

    pub async fn set_watermark(&self, timestamp: &str) -> Result<()> {
        let db = self.lock().await?;
        SqliteSyncMetaRepository::new(db.connection()).set_watermark(timestamp)
    }
}
