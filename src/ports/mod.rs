//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay core and the outside world. Adapters implement these ports.
//!
//! - `ConnectionSink` - push events to one live transport connection
//! - `MessageStore` - durably record delivered messages

mod connection_sink;
mod message_store;

pub use connection_sink::ConnectionSink;
pub use message_store::{MessageStore, PersistenceError};
