//! Relay domain module.
//!
//! In-memory state of the real-time relay: which connection speaks for which
//! user, which connections sit in which room, and the message types that flow
//! between them. Nothing here does I/O; the application layer serializes
//! access and the adapters move bytes.

mod connection;
mod errors;
mod membership;
mod message;
mod registry;

pub use connection::ConnectionState;
pub use errors::RelayError;
pub use membership::MembershipTracker;
pub use message::{
    Delivery, Destination, MessageContent, MessageRecord, RelayEvent, SendReceipt,
};
pub use registry::{ConnectionRegistry, Registration};
