//! Room ↔ connection membership index.
//!
//! Rooms exist implicitly while at least one connection is joined; an empty
//! room is dropped from the index. Both directions are updated in the same
//! call so they never disagree.

use std::collections::{HashMap, HashSet};

use crate::domain::foundation::{ConnectionId, RoomId};

/// Bidirectional membership index: room → members for broadcast,
/// connection → rooms for disconnect cleanup.
#[derive(Debug, Default)]
pub struct MembershipTracker {
    members: HashMap<RoomId, HashSet<ConnectionId>>,
    joined: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl MembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection_id` to `room_id`. Returns false if it was already a member.
    pub fn join(&mut self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        let added = self
            .members
            .entry(room_id.clone())
            .or_default()
            .insert(connection_id);
        self.joined.entry(connection_id).or_default().insert(room_id);
        added
    }

    /// Removes `connection_id` from `room_id`. Returns false for a non-member.
    pub fn leave(&mut self, connection_id: &ConnectionId, room_id: &RoomId) -> bool {
        let removed = match self.members.get_mut(room_id) {
            Some(members) => {
                let removed = members.remove(connection_id);
                if members.is_empty() {
                    self.members.remove(room_id);
                }
                removed
            }
            None => false,
        };

        if let Some(rooms) = self.joined.get_mut(connection_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.joined.remove(connection_id);
            }
        }

        removed
    }

    /// Removes the connection from every room it joined.
    ///
    /// Returns the rooms it was removed from.
    pub fn leave_all(&mut self, connection_id: &ConnectionId) -> Vec<RoomId> {
        let rooms: Vec<RoomId> = self
            .joined
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();

        for room_id in &rooms {
            self.leave(connection_id, room_id);
        }
        rooms
    }

    /// Current members of a room. Unknown rooms have no members.
    pub fn members_of(&self, room_id: &RoomId) -> HashSet<ConnectionId> {
        self.members.get(room_id).cloned().unwrap_or_default()
    }

    /// Iterates members without cloning the set.
    pub fn iter_members<'a>(
        &'a self,
        room_id: &RoomId,
    ) -> impl Iterator<Item = ConnectionId> + 'a {
        self.members
            .get(room_id)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    /// Rooms a connection is currently joined to.
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> HashSet<RoomId> {
        self.joined.get(connection_id).cloned().unwrap_or_default()
    }

    pub fn is_member(&self, connection_id: &ConnectionId, room_id: &RoomId) -> bool {
        self.members
            .get(room_id)
            .is_some_and(|members| members.contains(connection_id))
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    /// True when both indexes describe the same membership.
    pub fn is_consistent(&self) -> bool {
        let forward = self.members.iter().all(|(room, conns)| {
            !conns.is_empty()
                && conns
                    .iter()
                    .all(|c| self.joined.get(c).is_some_and(|rooms| rooms.contains(room)))
        });
        let backward = self.joined.iter().all(|(conn, rooms)| {
            !rooms.is_empty()
                && rooms
                    .iter()
                    .all(|r| self.members.get(r).is_some_and(|conns| conns.contains(conn)))
        });
        forward && backward
    }
}
