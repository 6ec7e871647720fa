//! ruralgest-core - Offline-first sync core for RuralGest
//!
//! This crate contains the local store, the inventory models, the
//! connectivity monitor and the sync engine shared by every RuralGest client.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use connectivity::{Connectivity, ConnectivityMonitor, Subscription, Transition};
pub use db::StoreLocation;
pub use error::{Error, Result};
pub use models::{Collection, MutationPayload, PendingMutation, RecordKey};
pub use services::{InventoryService, LocalStore};
pub use sync::{AutoSyncScheduler, HttpRemote, RemoteAuthority, SyncEngine, SyncOutcome};
