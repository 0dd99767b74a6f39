//! Application layer - relay orchestration.
//!
//! `Relay` owns the in-memory state and handles every connection event.
//! The router picks delivery targets and the persistence bridge records
//! delivered messages in the background.

pub mod persistence_bridge;
pub mod relay;
pub mod router;

pub use persistence_bridge::{
    record_with_timeout, PersistenceBridge, PersistenceCounters, PersistenceSettings,
    PersistenceWorker,
};
pub use relay::{MessageDraft, Relay, RelaySettings, RelaySnapshot};
