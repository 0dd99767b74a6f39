//! MessageStore port - durable message history owned by the CRUD service.
//!
//! The relay only needs "durably record this message" with a success or
//! failure outcome. Schema, auth and storage format belong to the store.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::relay::MessageRecord;

/// Errors a message store can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// Store could not be reached.
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    /// Store answered with a non-success status.
    #[error("Store rejected message with status {status}")]
    Rejected { status: u16 },

    /// Store did not answer in time.
    #[error("Store call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Port for recording delivered messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Durably record one message.
    async fn record(&self, record: &MessageRecord) -> Result<(), PersistenceError>;

    /// Store name for logging.
    fn name(&self) -> &'static str;
}
