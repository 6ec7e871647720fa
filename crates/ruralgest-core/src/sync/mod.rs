//! Synchronization between the local store and the backend.

mod engine;
mod remote;
mod scheduler;

pub use engine::{
    EngineOptions, FailedPushPolicy, FailureKind, SyncEngine, SyncFailure, SyncOutcome,
    SyncReport,
};
pub use remote::{
    is_retryable_status, normalize_base_url, resolve_endpoint, HttpRemote, PullDelta,
    RemoteAuthority, RemoteOptions, PULL_ENDPOINT,
};
pub use scheduler::{AutoSyncScheduler, DEFAULT_SYNC_INTERVAL, MAX_SYNC_INTERVAL};
