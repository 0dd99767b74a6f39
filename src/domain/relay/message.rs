//! Messages in transit through the relay.

use serde::Serialize;

use crate::domain::foundation::{RoomId, Timestamp, UserIdentity, ValidationError};

use super::RelayError;

/// Where a message goes. Room and recipient are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Destination {
    Room(RoomId),
    User(UserIdentity),
}

impl Destination {
    /// Builds a destination from the two optional address fields.
    ///
    /// Exactly one must be present.
    pub fn from_parts(
        room: Option<RoomId>,
        recipient: Option<UserIdentity>,
    ) -> Result<Self, RelayError> {
        match (room, recipient) {
            (Some(room), None) => Ok(Destination::Room(room)),
            (None, Some(user)) => Ok(Destination::User(user)),
            (Some(_), Some(_)) => Err(RelayError::invalid_addressing(
                "message names both a room and a recipient",
            )),
            (None, None) => Err(RelayError::invalid_addressing(
                "message names neither a room nor a recipient",
            )),
        }
    }
}

/// Message body checked against the configured size limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(content: impl Into<String>, max_bytes: usize) -> Result<Self, ValidationError> {
        let content = content.into();
        if content.len() > max_bytes {
            return Err(ValidationError::too_long("content", max_bytes, content.len()));
        }
        Ok(Self(content))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// What one recipient connection sees. Every target of a single logical
/// message receives the same timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub content: String,
    pub sender_display_name: String,
    pub timestamp: Timestamp,
}

/// Events the relay pushes to live connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    RoomMessage { room_id: RoomId, delivery: Delivery },
    PrivateMessage { delivery: Delivery },
}

impl RelayEvent {
    pub fn delivery(&self) -> &Delivery {
        match self {
            RelayEvent::RoomMessage { delivery, .. } => delivery,
            RelayEvent::PrivateMessage { delivery } => delivery,
        }
    }
}

/// Fire-and-forget record handed to the persistence bridge after delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub destination: Destination,
    pub content: String,
    pub sender: String,
    pub timestamp: Timestamp,
}

/// Outcome of a send. `delivered` is informational, never used for retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub delivered: usize,
    pub timestamp: Timestamp,
    /// False only for direct messages whose recipient had no live connection.
    pub recipient_available: bool,
    pub persistence_queued: bool,
}
