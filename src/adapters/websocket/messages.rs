//! WebSocket message types for the chat relay.
//!
//! Defines the protocol between server and connected clients:
//! - Server → Client: connection ack, room and private messages, errors, pongs
//! - Client → Server: register, join/leave room, send messages, pings
//!
//! Every frame is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConnectionId, ErrorCode, RoomId, Timestamp, UserIdentity};
use crate::domain::relay::RelayEvent;

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Connection accepted.
    Connected(ConnectedMessage),

    /// Broadcast from another member of a joined room.
    ReceiveRoomMessage(RoomMessagePayload),

    /// Direct message, or the echo of one this connection sent.
    ReceivePrivateMessage(PrivateMessagePayload),

    /// The last client frame was rejected.
    Error(ErrorMessage),

    /// Heartbeat response.
    Pong(PongMessage),
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            code: code.to_string(),
            message: message.into(),
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn pong() -> Self {
        ServerMessage::Pong(PongMessage {
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }
}

/// Sent once, right after the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub connection_id: String,
    pub timestamp: String,
}

impl ConnectedMessage {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            timestamp: Timestamp::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessagePayload {
    pub room_id: String,
    pub content: String,
    pub sender_display_name: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessagePayload {
    pub content: String,
    pub sender_display_name: String,
    pub timestamp: String,
}

/// Error message sent to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

/// Heartbeat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PongMessage {
    pub timestamp: String,
}

impl From<RelayEvent> for ServerMessage {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::RoomMessage { room_id, delivery } => {
                ServerMessage::ReceiveRoomMessage(RoomMessagePayload {
                    room_id: room_id.to_string(),
                    content: delivery.content,
                    sender_display_name: delivery.sender_display_name,
                    timestamp: delivery.timestamp.to_rfc3339(),
                })
            }
            RelayEvent::PrivateMessage { delivery } => {
                ServerMessage::ReceivePrivateMessage(PrivateMessagePayload {
                    content: delivery.content,
                    sender_display_name: delivery.sender_display_name,
                    timestamp: delivery.timestamp.to_rfc3339(),
                })
            }
        }
    }
}

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind a user identity to this connection.
    Register(RegisterRequest),

    JoinRoom(RoomRequest),

    LeaveRoom(RoomRequest),

    SendRoomMessage(RoomMessageRequest),

    SendPrivateMessage(PrivateMessageRequest),

    /// Room or recipient, decided by which field is present.
    SendMessage(SendMessageRequest),

    /// Heartbeat request.
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(alias = "userId")]
    pub user_identity: UserIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    #[serde(alias = "room")]
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessageRequest {
    #[serde(alias = "room")]
    pub room_id: RoomId,
    #[serde(alias = "message")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessageRequest {
    #[serde(alias = "recipientId")]
    pub recipient_user_identity: UserIdentity,
    #[serde(alias = "message")]
    pub content: String,
    #[serde(default)]
    pub sender_display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default, alias = "room")]
    pub room_id: Option<RoomId>,
    #[serde(default, alias = "recipientId")]
    pub recipient_user_identity: Option<UserIdentity>,
    #[serde(alias = "message")]
    pub content: String,
    #[serde(default)]
    pub sender_display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::relay::Delivery;

    #[test]
    fn client_message_deserializes_register() {
        let json = r#"{"type": "register", "userIdentity": "alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Register(RegisterRequest {
                user_identity: UserIdentity::new("alice").unwrap()
            })
        );
    }

    #[test]
    fn client_message_accepts_numeric_ids() {
        let json = r#"{"type": "joinRoom", "roomId": 42}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom(RoomRequest {
                room_id: RoomId::new("42").unwrap()
            })
        );
    }

    #[test]
    fn client_message_accepts_short_field_names() {
        let json = r#"{"type": "sendRoomMessage", "room": "general", "message": "hi"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SendRoomMessage(RoomMessageRequest { ref content, .. }) if content == "hi"
        ));
    }

    #[test]
    fn private_message_display_name_is_optional() {
        let json = r#"{"type": "sendPrivateMessage", "recipientId": 7, "content": "yo"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::SendPrivateMessage(req) => {
                assert_eq!(req.recipient_user_identity.as_str(), "7");
                assert_eq!(req.sender_display_name, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn send_message_without_target_still_parses() {
        let json = r#"{"type": "sendMessage", "content": "lost"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::SendMessage(req) => {
                assert!(req.room_id.is_none());
                assert!(req.recipient_user_identity.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn client_message_deserializes_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn blank_room_is_rejected_at_parse() {
        let json = r#"{"type": "joinRoom", "roomId": "  "}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "shout"}"#).is_err());
    }

    #[test]
    fn server_message_serializes_with_type_tag() {
        let msg = ServerMessage::Connected(ConnectedMessage {
            connection_id: "conn-1".to_string(),
            timestamp: "2025-01-10T00:00:00.000Z".to_string(),
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"connected""#));
        assert!(json.contains(r#""connectionId":"conn-1""#));
    }

    #[test]
    fn room_event_converts_to_receive_room_message() {
        let timestamp = Timestamp::now();
        let event = RelayEvent::RoomMessage {
            room_id: RoomId::new("general").unwrap(),
            delivery: Delivery {
                content: "hi".to_string(),
                sender_display_name: "alice".to_string(),
                timestamp,
            },
        };

        let json = serde_json::to_value(ServerMessage::from(event)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "receiveRoomMessage",
                "roomId": "general",
                "content": "hi",
                "senderDisplayName": "alice",
                "timestamp": timestamp.to_rfc3339(),
            })
        );
    }

    #[test]
    fn error_message_uses_wire_code() {
        let msg = ServerMessage::error(ErrorCode::InvalidAddressing, "no target");

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "INVALID_ADDRESSING");
        assert_eq!(json["message"], "no target");
    }
}
