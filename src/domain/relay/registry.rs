//! User → live connection index.
//!
//! Single slot per user: registering a second connection for the same user
//! supersedes the first, so direct messages stop reaching the older session.
//! This is a deliberate constraint of the relay (no multi-device fan-out for
//! direct messages), not an accident of the data structure.

use std::collections::HashMap;

use crate::domain::foundation::{ConnectionId, UserIdentity};

/// In-memory registry of which connection currently speaks for which user.
///
/// Keeps a reverse index so `remove` by connection is O(1).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_user: HashMap<UserIdentity, ConnectionId>,
    by_connection: HashMap<ConnectionId, UserIdentity>,
}

/// Side effects of a `register` call, reported for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    /// Connection that previously held this user's slot.
    pub superseded: Option<ConnectionId>,
    /// Identity this connection was registered under before, if it changed.
    pub previous_identity: Option<UserIdentity>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or overwrites) the live connection for `user`.
    ///
    /// Last write wins. If the connection was registered under another
    /// identity, that older entry is dropped so one connection never
    /// answers for two users.
    pub fn register(&mut self, user: UserIdentity, connection_id: ConnectionId) -> Registration {
        let mut outcome = Registration::default();

        if let Some(old_user) = self.by_connection.remove(&connection_id) {
            if old_user != user {
                if self.by_user.get(&old_user) == Some(&connection_id) {
                    self.by_user.remove(&old_user);
                }
                outcome.previous_identity = Some(old_user);
            }
        }

        if let Some(previous) = self.by_user.insert(user.clone(), connection_id) {
            if previous != connection_id {
                self.by_connection.remove(&previous);
                outcome.superseded = Some(previous);
            }
        }
        self.by_connection.insert(connection_id, user);

        outcome
    }

    /// Looks up the live connection for `user`.
    ///
    /// `None` is a normal delivery miss, not an error.
    pub fn resolve(&self, user: &UserIdentity) -> Option<ConnectionId> {
        self.by_user.get(user).copied()
    }

    /// Identity bound to a connection, if any.
    pub fn identity_of(&self, connection_id: &ConnectionId) -> Option<&UserIdentity> {
        self.by_connection.get(connection_id)
    }

    /// Deletes the entry pointing at `connection_id`. No-op if there is none.
    ///
    /// Returns the user whose slot was freed.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<UserIdentity> {
        let user = self.by_connection.remove(connection_id)?;
        if self.by_user.get(&user) == Some(connection_id) {
            self.by_user.remove(&user);
        }
        Some(user)
    }

    /// Drops the slot for `user` only if it still points at `connection_id`.
    pub fn evict(&mut self, user: &UserIdentity, connection_id: &ConnectionId) -> bool {
        if self.by_user.get(user) != Some(connection_id) {
            return false;
        }
        self.by_user.remove(user);
        self.by_connection.remove(connection_id);
        true
    }

    /// Number of users with a live connection.
    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    /// True if any user slot points at `connection_id`.
    pub fn references(&self, connection_id: &ConnectionId) -> bool {
        self.by_user.values().any(|c| c == connection_id)
    }
}
