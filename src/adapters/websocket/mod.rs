//! WebSocket transport for the chat relay.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ClientMessage   ┌──────────────┐
//! │  WebSocket   │ ───────────────▶ │   dispatch   │ ──▶ Relay
//! │  (recv task) │                  └──────────────┘      │
//! └──────────────┘                                        │ RelayEvent
//!                                                         ▼
//! ┌──────────────┐  ServerMessage   ┌──────────────────────────────┐
//! │  WebSocket   │ ◀─────────────── │  Sender<ServerMessage> (N)   │
//! │ (send task)  │                  │      (ConnectionSink)        │
//! └──────────────┘                  └──────────────────────────────┘
//! ```
//!
//! Each connection's outbound queue holds at most N frames. A client that
//! stops reading loses deliveries once its queue is full; other clients are
//! unaffected.
//!
//! # Components
//!
//! - [`messages`] - WebSocket message protocol types
//! - [`handler`] - Axum WebSocket upgrade handler and frame dispatch

pub mod handler;
pub mod messages;

pub use handler::{dispatch, websocket_router, ws_handler, WebSocketState};
pub use messages::{
    ClientMessage, ConnectedMessage, ErrorMessage, PongMessage, PrivateMessagePayload,
    RoomMessagePayload, ServerMessage,
};
