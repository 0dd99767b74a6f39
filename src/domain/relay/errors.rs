//! Relay-specific error types.
//!
//! Every variant is handled inside the relay; none of them is allowed to take
//! down the process or affect connections other than the one that caused it.

use thiserror::Error;

use crate::domain::foundation::{
    ConnectionId, ErrorCode, TransitionError, UserIdentity, ValidationError,
};

/// Relay errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Direct-message target has no live connection. Delivery is skipped,
    /// persistence is still attempted.
    #[error("Recipient {0} has no live connection")]
    RecipientUnavailable(UserIdentity),

    /// Durable write failed or timed out. The message is lost from history.
    #[error("Message store unavailable: {reason}")]
    PersistenceUnavailable { reason: String },

    /// Neither or both of room and recipient were set.
    #[error("Invalid addressing: {0}")]
    InvalidAddressing(String),

    /// Registry pointed at a connection that is no longer open.
    #[error("Registry entry for {user} referenced closed connection {connection_id}")]
    StaleConnectionReference {
        user: UserIdentity,
        connection_id: ConnectionId,
    },

    /// Event arrived for a connection the relay does not know (or already closed).
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Lifecycle transition rejected.
    #[error(transparent)]
    InvalidState(#[from] TransitionError),

    /// Payload failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl RelayError {
    pub fn persistence_unavailable(reason: impl Into<String>) -> Self {
        RelayError::PersistenceUnavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_addressing(reason: impl Into<String>) -> Self {
        RelayError::InvalidAddressing(reason.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::RecipientUnavailable(_) => ErrorCode::RecipientUnavailable,
            RelayError::PersistenceUnavailable { .. } => ErrorCode::PersistenceUnavailable,
            RelayError::InvalidAddressing(_) => ErrorCode::InvalidAddressing,
            RelayError::StaleConnectionReference { .. } => ErrorCode::StaleConnectionReference,
            RelayError::ConnectionNotFound(_) => ErrorCode::ConnectionNotFound,
            RelayError::InvalidState(_) => ErrorCode::InvalidStateTransition,
            RelayError::Validation(err) => err.code(),
        }
    }
}
