//! Data models for RuralGest

mod collection;
mod inventory;
mod pending;

use serde::{Deserialize, Serialize};

pub use collection::{Collection, RecordKey};
pub use inventory::{Consumption, Product, Purchase};
pub use pending::{DeadLetter, MutationPayload, PendingMutation};

/// Boundary of already-synchronized remote data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWatermark {
    /// Timestamp exactly as handed out by the remote authority
    pub timestamp: String,
}
