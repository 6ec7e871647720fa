//! Database layer for the local store

mod connection;
mod migrations;
mod pending_repository;
mod repository;
mod sync_meta_repository;

pub use connection::{Database, StoreLocation};
pub use pending_repository::{PendingRepository, SqlitePendingRepository};
pub use repository::{CollectionRepository, SqliteCollectionRepository};
pub use sync_meta_repository::{SqliteSyncMetaRepository, WATERMARK_KEY};
