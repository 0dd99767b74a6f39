//! Connection lifecycle status.

use serde::Serialize;

use crate::domain::foundation::StateMachine;

/// Lifecycle of one transport connection.
///
/// ```text
/// Connected --register--> Registered --register--> Registered
///     |                       |
///     +------disconnect-------+-----> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Accepted by the transport, no user identity bound yet.
    Connected,
    /// A user identity is bound; reachable by direct messages.
    Registered,
    /// Terminal. The connection is gone from every index.
    Closed,
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Connected, Registered)
                | (Connected, Closed)
                | (Registered, Registered)
                | (Registered, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Connected => vec![Registered, Closed],
            Registered => vec![Registered, Closed],
            Closed => vec![],
        }
    }
}
