//! WebSocket upgrade handler for chat relay connections.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Upgrade to WebSocket
//! 2. Hand the relay a bounded sink for this connection
//! 3. Dispatch client frames to the relay, in the order received
//! 4. Disconnect from the relay when either side closes or the server stops

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

use crate::application::{MessageDraft, Relay};
use crate::domain::foundation::{ConnectionId, ErrorCode};
use crate::domain::relay::{RelayError, RelayEvent};
use crate::ports::ConnectionSink;

use super::messages::{ClientMessage, ConnectedMessage, ServerMessage};

/// Default per-connection outbound queue size.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub relay: Arc<Relay>,
    outbound_capacity: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl WebSocketState {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            shutdown: None,
        }
    }

    /// Frames buffered per connection before deliveries to it are dropped.
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Open sockets are closed and disconnected once this turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }
}

/// Outbound queue of one socket. The writer task drains it.
///
/// A full queue drops the frame instead of waiting, since the relay delivers
/// under its state lock.
impl ConnectionSink for mpsc::Sender<ServerMessage> {
    fn deliver(&self, event: RelayEvent) -> bool {
        match self.try_send(ServerMessage::from(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    capacity = self.max_capacity(),
                    "Outbound queue full, dropping frame for slow client"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs for the lifetime of one connection.
async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.outbound_capacity);

    let connection_id = state.relay.connect(Arc::new(tx.clone())).await;

    // Nothing can target a fresh connection yet, so the queue has room.
    let _ = tx.try_send(ServerMessage::Connected(ConnectedMessage::new(connection_id)));

    // Writer: everything for this client goes through the channel, so relay
    // deliveries and direct replies keep their relative order.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = send_message(&mut sender, &msg).await {
                tracing::debug!(%connection_id, "Send error, closing connection: {}", e);
                break;
            }
        }
    });

    let relay = state.relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(msg) => dispatch(&relay, connection_id, msg).await,
                        Err(e) => {
                            tracing::debug!(%connection_id, "Unparseable frame: {}", e);
                            Some(ServerMessage::error(ErrorCode::InvalidMessage, e.to_string()))
                        }
                    };
                    if let Some(reply) = reply {
                        if tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!(%connection_id, "Received unsupported binary message");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Protocol-level heartbeats are answered by axum
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(%connection_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%connection_id, "Receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        _ = server_stopping(state.shutdown.clone()) => {
            tracing::debug!(%connection_id, "Server stopping, closing connection");
            send_task.abort();
            recv_task.abort();
        }
    }

    if let Err(e) = state.relay.disconnect(connection_id).await {
        tracing::warn!(%connection_id, error = %e, "Disconnect cleanup failed");
    }
}

/// Resolves once the server asks open sockets to close. Never resolves
/// without a shutdown signal, or after its sender is dropped.
async fn server_stopping(shutdown: Option<watch::Receiver<bool>>) {
    if let Some(mut shutdown) = shutdown {
        if shutdown.wait_for(|stop| *stop).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Applies one client frame to the relay.
///
/// Returns the reply for the sending client, if any. Failures are reported to
/// this client only.
pub async fn dispatch(
    relay: &Relay,
    connection_id: ConnectionId,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    let result = match msg {
        ClientMessage::Register(req) => relay.register(connection_id, req.user_identity).await,
        ClientMessage::JoinRoom(req) => relay.join_room(connection_id, req.room_id).await.map(drop),
        ClientMessage::LeaveRoom(req) => {
            relay.leave_room(connection_id, &req.room_id).await.map(drop)
        }
        ClientMessage::SendRoomMessage(req) => relay
            .send_room_message(connection_id, req.room_id, req.content)
            .await
            .map(drop),
        ClientMessage::SendPrivateMessage(req) => relay
            .send_private_message(
                connection_id,
                req.recipient_user_identity,
                req.content,
                req.sender_display_name.as_deref(),
            )
            .await
            .map(drop),
        ClientMessage::SendMessage(req) => relay
            .send_message(
                connection_id,
                MessageDraft {
                    room_id: req.room_id,
                    recipient: req.recipient_user_identity,
                    content: req.content,
                    sender_display_name: req.sender_display_name,
                },
            )
            .await
            .map(drop),
        ClientMessage::Ping => return Some(ServerMessage::pong()),
    };

    result.err().map(|e| error_reply(connection_id, e))
}

fn error_reply(connection_id: ConnectionId, err: RelayError) -> ServerMessage {
    tracing::debug!(%connection_id, code = %err.code(), "Rejected client frame: {}", err);
    ServerMessage::error(err.code(), err.to_string())
}

/// Send a JSON message over the WebSocket.
async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}

/// Create axum router for the WebSocket endpoint.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .merge(websocket_router().with_state(WebSocketState::new(relay)));
/// ```
pub fn websocket_router() -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new().route("/ws", get(ws_handler))
}
