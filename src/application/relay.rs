//! Relay - connection lifecycle manager and the single owner of relay state.
//!
//! All mutable state (connection records, the user registry, the room
//! membership index) lives behind one `RwLock`. Every inbound event takes the
//! lock once, so a register racing a disconnect can never leave a registry
//! entry pointing at a closed connection.
//!
//! Delivery happens while the lock is held, through non-blocking sinks, which
//! keeps per-sender order. Persistence is handed to the bridge after the lock
//! is released and never awaited.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::foundation::{ConnectionId, RoomId, StateMachine, Timestamp, UserIdentity};
use crate::domain::relay::{
    ConnectionRegistry, ConnectionState, Delivery, Destination, MembershipTracker, MessageContent,
    MessageRecord, RelayError, RelayEvent, SendReceipt,
};
use crate::ports::ConnectionSink;

use super::persistence_bridge::{PersistenceBridge, PersistenceCounters};
use super::router;

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Largest accepted message body, in bytes.
    pub max_content_bytes: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_content_bytes: 4096,
        }
    }
}

/// A send request with open addressing. Exactly one of `room_id` and
/// `recipient` must be set.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub room_id: Option<RoomId>,
    pub recipient: Option<UserIdentity>,
    pub content: String,
    pub sender_display_name: Option<String>,
}

/// Counts for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySnapshot {
    pub connections: usize,
    pub registered_users: usize,
    pub rooms: usize,
}

struct ConnectionRecord {
    state: ConnectionState,
    sink: Arc<dyn ConnectionSink>,
    connected_at: Timestamp,
}

#[derive(Default)]
struct RelayState {
    connections: HashMap<ConnectionId, ConnectionRecord>,
    registry: ConnectionRegistry,
    membership: MembershipTracker,
}

impl RelayState {
    fn record(&self, connection_id: ConnectionId) -> Result<&ConnectionRecord, RelayError> {
        self.connections
            .get(&connection_id)
            .ok_or(RelayError::ConnectionNotFound(connection_id))
    }

    fn record_mut(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<&mut ConnectionRecord, RelayError> {
        self.connections
            .get_mut(&connection_id)
            .ok_or(RelayError::ConnectionNotFound(connection_id))
    }

    /// Resolves `user` to an open connection, evicting entries that point at
    /// a connection that is gone or whose transport already closed.
    fn resolve_live(&mut self, user: &UserIdentity) -> Option<ConnectionId> {
        let connection_id = self.registry.resolve(user)?;
        let live = self
            .connections
            .get(&connection_id)
            .is_some_and(|record| record.sink.is_open());
        if live {
            return Some(connection_id);
        }

        let err = RelayError::StaleConnectionReference {
            user: user.clone(),
            connection_id,
        };
        tracing::warn!(error = %err, "Evicting stale registry entry");
        self.registry.evict(user, &connection_id);
        None
    }

    fn sink_of(&self, connection_id: &ConnectionId) -> Option<&Arc<dyn ConnectionSink>> {
        self.connections.get(connection_id).map(|record| &record.sink)
    }
}

/// Real-time relay.
pub struct Relay {
    state: RwLock<RelayState>,
    bridge: PersistenceBridge,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(bridge: PersistenceBridge, settings: RelaySettings) -> Self {
        Self {
            state: RwLock::new(RelayState::default()),
            bridge,
            settings,
        }
    }

    /// Accepts a new transport connection in the `Connected` state.
    pub async fn connect(&self, sink: Arc<dyn ConnectionSink>) -> ConnectionId {
        let connection_id = ConnectionId::new();
        let mut state = self.state.write().await;
        state.connections.insert(
            connection_id,
            ConnectionRecord {
                state: ConnectionState::Connected,
                sink,
                connected_at: Timestamp::now(),
            },
        );
        tracing::info!(%connection_id, total = state.connections.len(), "Connection accepted");
        connection_id
    }

    /// Binds `user` to the connection. Re-registration overwrites.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        user: UserIdentity,
    ) -> Result<(), RelayError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(connection_id)?;
        record.state = record.state.transition_to(ConnectionState::Registered)?;

        let registration = state.registry.register(user.clone(), connection_id);
        if let Some(superseded) = registration.superseded {
            tracing::info!(
                %user,
                %connection_id,
                %superseded,
                "User registered from a new connection, older session no longer receives direct messages"
            );
        }
        if let Some(previous) = registration.previous_identity {
            tracing::debug!(%connection_id, %previous, %user, "Connection re-registered under new identity");
        }
        tracing::info!(%user, %connection_id, "User registered");
        Ok(())
    }

    /// Adds the connection to a room. Returns false if it was already a member.
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<bool, RelayError> {
        let mut state = self.state.write().await;
        // Closed connections have no record, so any record may join rooms.
        state.record(connection_id)?;

        let joined = state.membership.join(connection_id, room_id.clone());
        tracing::debug!(%connection_id, %room_id, joined, "Join room");
        Ok(joined)
    }

    /// Removes the connection from a room. Leaving a room twice is a no-op.
    pub async fn leave_room(
        &self,
        connection_id: ConnectionId,
        room_id: &RoomId,
    ) -> Result<bool, RelayError> {
        let mut state = self.state.write().await;
        state.record(connection_id)?;

        let left = state.membership.leave(&connection_id, room_id);
        tracing::debug!(%connection_id, %room_id, left, "Leave room");
        Ok(left)
    }

    /// Broadcasts to every room member except the sender, then queues the
    /// message for persistence.
    pub async fn send_room_message(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
        content: impl Into<String>,
    ) -> Result<SendReceipt, RelayError> {
        let content = MessageContent::new(content, self.settings.max_content_bytes)?;
        let timestamp = Timestamp::now();

        let (delivered, sender) = {
            let state = self.state.read().await;
            state.record(connection_id)?;

            let sender = router::sender_display_name(
                None,
                state.registry.identity_of(&connection_id),
                connection_id,
            );
            let event = RelayEvent::RoomMessage {
                room_id: room_id.clone(),
                delivery: Delivery {
                    content: content.as_str().to_string(),
                    sender_display_name: sender.clone(),
                    timestamp,
                },
            };
            let targets = router::room_targets(&state.membership, &room_id, connection_id);
            let delivered = router::fan_out(&targets, |id| state.sink_of(id), &event);
            (delivered, sender)
        };

        tracing::debug!(%connection_id, %room_id, delivered, "Room message relayed");

        let persistence_queued = self.persist(MessageRecord {
            destination: Destination::Room(room_id),
            content: content.into_inner(),
            sender,
            timestamp,
        });

        Ok(SendReceipt {
            delivered,
            timestamp,
            recipient_available: true,
            persistence_queued,
        })
    }

    /// Delivers to the recipient's live connection and echoes to the sender.
    ///
    /// A recipient without a live connection is not an error: only the echo
    /// is delivered and the message is still queued for persistence.
    pub async fn send_private_message(
        &self,
        connection_id: ConnectionId,
        recipient: UserIdentity,
        content: impl Into<String>,
        sender_display_name: Option<&str>,
    ) -> Result<SendReceipt, RelayError> {
        let content = MessageContent::new(content, self.settings.max_content_bytes)?;
        let timestamp = Timestamp::now();

        let (delivered, recipient_connection, sender) = {
            let mut state = self.state.write().await;
            state.record(connection_id)?;

            let recipient_connection = state.resolve_live(&recipient);
            let sender = router::sender_display_name(
                sender_display_name,
                state.registry.identity_of(&connection_id),
                connection_id,
            );
            let event = RelayEvent::PrivateMessage {
                delivery: Delivery {
                    content: content.as_str().to_string(),
                    sender_display_name: sender.clone(),
                    timestamp,
                },
            };
            let targets = router::direct_targets(recipient_connection, connection_id);
            let delivered = router::fan_out(&targets, |id| state.sink_of(id), &event);
            (delivered, recipient_connection, sender)
        };

        let recipient_available = recipient_connection.is_some();
        if !recipient_available {
            let miss = RelayError::RecipientUnavailable(recipient.clone());
            tracing::debug!(%connection_id, reason = %miss, "Direct message not delivered live");
        }

        let persistence_queued = self.persist(MessageRecord {
            destination: Destination::User(recipient),
            content: content.into_inner(),
            sender,
            timestamp,
        });

        Ok(SendReceipt {
            delivered,
            timestamp,
            recipient_available,
            persistence_queued,
        })
    }

    /// Sends a message whose addressing is decided by which target is set.
    ///
    /// # Errors
    ///
    /// `InvalidAddressing` when neither or both targets are set. Nothing is
    /// delivered or persisted in that case.
    pub async fn send_message(
        &self,
        connection_id: ConnectionId,
        draft: MessageDraft,
    ) -> Result<SendReceipt, RelayError> {
        match Destination::from_parts(draft.room_id, draft.recipient)? {
            Destination::Room(room_id) => {
                self.send_room_message(connection_id, room_id, draft.content)
                    .await
            }
            Destination::User(recipient) => {
                self.send_private_message(
                    connection_id,
                    recipient,
                    draft.content,
                    draft.sender_display_name.as_deref(),
                )
                .await
            }
        }
    }

    /// Closes the connection and removes it from every room and from the
    /// registry in one step.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), RelayError> {
        let mut state = self.state.write().await;
        let record = state
            .connections
            .remove(&connection_id)
            .ok_or(RelayError::ConnectionNotFound(connection_id))?;
        let rooms = state.membership.leave_all(&connection_id);
        let user = state.registry.remove(&connection_id);
        let closed = record.state.transition_to(ConnectionState::Closed)?;

        tracing::info!(
            %connection_id,
            user = user.as_ref().map(|u| u.as_str()),
            rooms_left = rooms.len(),
            state = ?closed,
            session_secs = Timestamp::now().duration_since(&record.connected_at).num_seconds(),
            "Connection closed"
        );
        Ok(())
    }

    /// Live connection for `user`, if any.
    pub async fn resolve(&self, user: &UserIdentity) -> Option<ConnectionId> {
        self.state.read().await.registry.resolve(user)
    }

    pub async fn members_of(&self, room_id: &RoomId) -> HashSet<ConnectionId> {
        self.state.read().await.membership.members_of(room_id)
    }

    pub async fn rooms_of(&self, connection_id: &ConnectionId) -> HashSet<RoomId> {
        self.state.read().await.membership.rooms_of(connection_id)
    }

    /// Lifecycle state. `None` for unknown or closed connections.
    pub async fn connection_state(&self, connection_id: &ConnectionId) -> Option<ConnectionState> {
        self.state
            .read()
            .await
            .connections
            .get(connection_id)
            .map(|record| record.state)
    }

    pub async fn snapshot(&self) -> RelaySnapshot {
        let state = self.state.read().await;
        RelaySnapshot {
            connections: state.connections.len(),
            registered_users: state.registry.len(),
            rooms: state.membership.room_count(),
        }
    }

    pub fn persistence_counters(&self) -> PersistenceCounters {
        self.bridge.counters()
    }

    fn persist(&self, record: MessageRecord) -> bool {
        match self.bridge.submit(record) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Message not queued for persistence");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::InMemoryMessageStore;
    use crate::application::persistence_bridge::{PersistenceSettings, PersistenceWorker};
    use crate::domain::foundation::ErrorCode;
    use tokio::sync::mpsc;

    type Inbox = mpsc::UnboundedReceiver<RelayEvent>;

    /// Worker is returned unspawned: records stay queued while the caller
    /// holds it.
    fn relay() -> (Relay, PersistenceWorker) {
        let store = Arc::new(InMemoryMessageStore::new());
        let (bridge, worker) = PersistenceBridge::new(store, PersistenceSettings::default());
        (Relay::new(bridge, RelaySettings::default()), worker)
    }

    async fn connect(relay: &Relay) -> (ConnectionId, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel::<RelayEvent>();
        let id = relay.connect(Arc::new(tx)).await;
        (id, rx)
    }

    fn user(name: &str) -> UserIdentity {
        UserIdentity::new(name).unwrap()
    }

    fn room(name: &str) -> RoomId {
        RoomId::new(name).unwrap()
    }

    #[tokio::test]
    async fn connect_starts_in_connected_state() {
        let (relay, _worker) = relay();
        let (conn, _rx) = connect(&relay).await;

        assert_eq!(relay.connection_state(&conn).await, Some(ConnectionState::Connected));
    }

    #[tokio::test]
    async fn register_moves_to_registered_and_resolves() {
        let (relay, _worker) = relay();
        let (conn, _rx) = connect(&relay).await;

        relay.register(conn, user("alice")).await.unwrap();

        assert_eq!(relay.connection_state(&conn).await, Some(ConnectionState::Registered));
        assert_eq!(relay.resolve(&user("alice")).await, Some(conn));
    }

    #[tokio::test]
    async fn second_registration_supersedes_first() {
        let (relay, _worker) = relay();
        let (first, _rx1) = connect(&relay).await;
        let (second, _rx2) = connect(&relay).await;

        relay.register(first, user("alice")).await.unwrap();
        relay.register(second, user("alice")).await.unwrap();

        assert_eq!(relay.resolve(&user("alice")).await, Some(second));
    }

    #[tokio::test]
    async fn events_on_unknown_connection_fail() {
        let (relay, _worker) = relay();
        let ghost = ConnectionId::new();

        let err = relay.join_room(ghost, room("general")).await.unwrap_err();
        assert_eq!(err, RelayError::ConnectionNotFound(ghost));

        let err = relay.register(ghost, user("alice")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionNotFound);
    }

    #[tokio::test]
    async fn room_broadcast_skips_sender() {
        let (relay, _worker) = relay();
        let (a, mut a_rx) = connect(&relay).await;
        let (c, mut c_rx) = connect(&relay).await;
        relay.register(a, user("alice")).await.unwrap();
        relay.join_room(a, room("general")).await.unwrap();
        relay.join_room(c, room("general")).await.unwrap();

        let receipt = relay.send_room_message(a, room("general"), "hi").await.unwrap();

        assert_eq!(receipt.delivered, 1);
        assert!(a_rx.try_recv().is_err());
        let event = c_rx.try_recv().unwrap();
        assert_eq!(event.delivery().content, "hi");
        assert_eq!(event.delivery().sender_display_name, "alice");
        assert_eq!(event.delivery().timestamp, receipt.timestamp);
    }

    #[tokio::test]
    async fn unregistered_sender_shows_connection_id() {
        let (relay, _worker) = relay();
        let (a, _a_rx) = connect(&relay).await;
        let (b, mut b_rx) = connect(&relay).await;
        relay.join_room(b, room("lobby")).await.unwrap();

        relay.send_room_message(a, room("lobby"), "anon").await.unwrap();

        let event = b_rx.try_recv().unwrap();
        assert_eq!(event.delivery().sender_display_name, a.to_string());
    }

    #[tokio::test]
    async fn private_message_reaches_recipient_and_echoes() {
        let (relay, _worker) = relay();
        let (a, mut a_rx) = connect(&relay).await;
        let (b, mut b_rx) = connect(&relay).await;
        relay.register(a, user("alice")).await.unwrap();
        relay.register(b, user("bob")).await.unwrap();

        let receipt = relay
            .send_private_message(b, user("alice"), "hey", Some("Bob"))
            .await
            .unwrap();

        assert_eq!(receipt.delivered, 2);
        assert!(receipt.recipient_available);
        let to_alice = a_rx.try_recv().unwrap();
        let echo = b_rx.try_recv().unwrap();
        assert_eq!(to_alice, echo);
        assert_eq!(to_alice.delivery().sender_display_name, "Bob");
    }

    #[tokio::test]
    async fn private_message_to_absent_user_still_persists() {
        let (relay, _worker) = relay();
        let (a, mut a_rx) = connect(&relay).await;
        relay.register(a, user("alice")).await.unwrap();

        let receipt = relay
            .send_private_message(a, user("nobody"), "are you there", None)
            .await
            .unwrap();

        assert!(!receipt.recipient_available);
        assert!(receipt.persistence_queued);
        assert_eq!(receipt.delivered, 1);
        assert!(a_rx.try_recv().is_ok());
        assert_eq!(relay.persistence_counters().submitted, 1);
    }

    #[tokio::test]
    async fn stale_registry_entry_is_evicted() {
        let (relay, _worker) = relay();
        let (a, _a_rx) = connect(&relay).await;
        let (b, b_rx) = connect(&relay).await;
        relay.register(a, user("alice")).await.unwrap();
        relay.register(b, user("bob")).await.unwrap();
        // Transport gone, disconnect not yet processed.
        drop(b_rx);

        let receipt = relay
            .send_private_message(a, user("bob"), "ping", None)
            .await
            .unwrap();

        assert!(!receipt.recipient_available);
        assert_eq!(relay.resolve(&user("bob")).await, None);
        // Later disconnect still succeeds.
        relay.disconnect(b).await.unwrap();
    }

    #[tokio::test]
    async fn send_message_rejects_bad_addressing_without_persisting() {
        let (relay, _worker) = relay();
        let (a, _a_rx) = connect(&relay).await;

        let err = relay
            .send_message(
                a,
                MessageDraft {
                    room_id: Some(room("general")),
                    recipient: Some(user("bob")),
                    content: "both".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::InvalidAddressing);
        assert_eq!(relay.persistence_counters().submitted, 0);
    }

    #[tokio::test]
    async fn oversized_content_is_rejected() {
        let store = Arc::new(InMemoryMessageStore::new());
        let (bridge, _worker) = PersistenceBridge::new(store, PersistenceSettings::default());
        let relay = Relay::new(bridge, RelaySettings { max_content_bytes: 4 });
        let (a, _a_rx) = connect(&relay).await;

        let err = relay
            .send_room_message(a, room("general"), "too long")
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ContentTooLarge);
        assert_eq!(relay.persistence_counters().submitted, 0);
    }

    #[tokio::test]
    async fn disconnect_cleans_rooms_and_registry() {
        let (relay, _worker) = relay();
        let (a, _a_rx) = connect(&relay).await;
        relay.register(a, user("alice")).await.unwrap();
        relay.join_room(a, room("general")).await.unwrap();
        relay.join_room(a, room("random")).await.unwrap();

        relay.disconnect(a).await.unwrap();

        assert!(relay.members_of(&room("general")).await.is_empty());
        assert!(relay.rooms_of(&a).await.is_empty());
        assert_eq!(relay.resolve(&user("alice")).await, None);
        assert_eq!(relay.connection_state(&a).await, None);
        assert_eq!(
            relay.snapshot().await,
            RelaySnapshot { connections: 0, registered_users: 0, rooms: 0 }
        );
    }

    #[tokio::test]
    async fn disconnect_twice_reports_not_found() {
        let (relay, _worker) = relay();
        let (a, _a_rx) = connect(&relay).await;

        relay.disconnect(a).await.unwrap();
        let err = relay.disconnect(a).await.unwrap_err();

        assert_eq!(err, RelayError::ConnectionNotFound(a));
    }

    #[tokio::test]
    async fn rooms_open_before_registration_and_closed_after_disconnect() {
        let (relay, _worker) = relay();
        let (a, _a_rx) = connect(&relay).await;

        assert!(relay.join_room(a, room("general")).await.unwrap());
        assert_eq!(relay.connection_state(&a).await, Some(ConnectionState::Connected));

        relay.disconnect(a).await.unwrap();
        let err = relay.join_room(a, room("general")).await.unwrap_err();

        assert_eq!(err, RelayError::ConnectionNotFound(a));
        assert!(relay.members_of(&room("general")).await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_of_superseded_session_keeps_newer_slot() {
        let (relay, _worker) = relay();
        let (old, _rx1) = connect(&relay).await;
        let (new, _rx2) = connect(&relay).await;
        relay.register(old, user("alice")).await.unwrap();
        relay.register(new, user("alice")).await.unwrap();

        relay.disconnect(old).await.unwrap();

        assert_eq!(relay.resolve(&user("alice")).await, Some(new));
    }
}
