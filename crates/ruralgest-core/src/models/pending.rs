//! Pending mutation queue models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where and what to replay against the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationPayload {
    /// Request path (joined to the backend URL) or absolute URL
    pub endpoint: String,
    /// Request body, sent as-is
    #[serde(alias = "payload")]
    pub body: Value,
}

impl MutationPayload {
    pub fn new(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            body,
        }
    }
}

/// A local write not yet confirmed by the remote authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// Queue sequence number (monotonic, assigned on enqueue)
    pub id: i64,
    /// Action identifier, e.g. `create_purchase`
    pub action: String,
    pub payload: MutationPayload,
    /// Enqueue time (RFC 3339)
    pub created_at: String,
    /// Failed replay attempts so far
    pub attempts: u32,
}

/// A pending mutation whose replay failed and was set aside
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: i64,
    pub action: String,
    pub payload: MutationPayload,
    pub created_at: String,
    pub attempts: u32,
    /// When the entry left the queue (RFC 3339)
    pub failed_at: String,
    /// Last replay error
    pub error: String,
}
