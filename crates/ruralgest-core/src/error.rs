//! Error types for ruralgest-core

use thiserror::Error;

/// Result type alias using ruralgest-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ruralgest-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error that does not come from `SQLite` itself
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error (connection refused, DNS, TLS, body decoding)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote authority answered with a non-success status
    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },

    /// Operation exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure happened on the way to or from the remote authority.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Remote { .. })
    }
}
