use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ruralgest_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("No {collection} record with id {key}")]
    RecordNotFound { collection: String, key: String },
    #[error("{0}")]
    SyncFailed(String),
    #[error(
        "Sync is not configured. Set RURALGEST_BACKEND_URL or pass --backend-url to enable `ruralgest sync`."
    )]
    SyncNotConfigured,
}
