//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types
//! that form the vocabulary of the relay domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{ErrorCode, ValidationError};
pub use ids::{ConnectionId, RoomId, UserIdentity};
pub use state_machine::{StateMachine, TransitionError};
pub use timestamp::Timestamp;
