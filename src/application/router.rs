//! Message routing: resolve targets, then fan out one event to each.
//!
//! Two addressing modes:
//! - room broadcast reaches every member except the sender, whose client
//!   renders its own optimistic copy;
//! - direct delivery reaches the recipient's connection plus the sender's own
//!   connection as an echo, since direct messages get no optimistic render.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::foundation::{ConnectionId, RoomId, UserIdentity};
use crate::domain::relay::{MembershipTracker, RelayEvent};
use crate::ports::ConnectionSink;

/// Room members that should receive a broadcast from `sender`.
pub fn room_targets(
    membership: &MembershipTracker,
    room_id: &RoomId,
    sender: ConnectionId,
) -> Vec<ConnectionId> {
    membership
        .iter_members(room_id)
        .filter(|member| *member != sender)
        .collect()
}

/// Connections that should receive a direct message.
///
/// The sender is always echoed; a missing recipient only removes the
/// recipient. Sending to oneself delivers once.
pub fn direct_targets(recipient: Option<ConnectionId>, sender: ConnectionId) -> Vec<ConnectionId> {
    let mut targets = BTreeSet::new();
    if let Some(recipient) = recipient {
        targets.insert(recipient);
    }
    targets.insert(sender);
    targets.into_iter().collect()
}

/// Name shown to recipients.
///
/// A non-blank client-supplied name wins, then the registered identity,
/// then the raw connection id.
pub fn sender_display_name(
    requested: Option<&str>,
    identity: Option<&UserIdentity>,
    connection_id: ConnectionId,
) -> String {
    if let Some(name) = requested.map(str::trim).filter(|name| !name.is_empty()) {
        return name.to_string();
    }
    match identity {
        Some(identity) => identity.to_string(),
        None => connection_id.to_string(),
    }
}

/// Pushes `event` to every target that has a sink. Returns how many
/// deliveries the transport accepted.
pub fn fan_out<'a, F>(targets: &[ConnectionId], lookup: F, event: &RelayEvent) -> usize
where
    F: Fn(&ConnectionId) -> Option<&'a Arc<dyn ConnectionSink>>,
{
    let mut delivered = 0;
    for target in targets {
        match lookup(target) {
            Some(sink) if sink.deliver(event.clone()) => delivered += 1,
            Some(_) => {
                tracing::debug!(connection_id = %target, "Target closed or backlogged, delivery dropped");
            }
            None => {
                tracing::debug!(connection_id = %target, "Target has no sink, skipping");
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use crate::domain::relay::Delivery;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    fn room(name: &str) -> RoomId {
        RoomId::new(name).unwrap()
    }

    fn event() -> RelayEvent {
        RelayEvent::RoomMessage {
            room_id: room("general"),
            delivery: Delivery {
                content: "hi".to_string(),
                sender_display_name: "alice".to_string(),
                timestamp: Timestamp::now(),
            },
        }
    }

    #[test]
    fn room_targets_exclude_sender() {
        let mut membership = MembershipTracker::new();
        let sender = ConnectionId::new();
        let other = ConnectionId::new();
        membership.join(sender, room("general"));
        membership.join(other, room("general"));

        let targets = room_targets(&membership, &room("general"), sender);

        assert_eq!(targets, vec![other]);
    }

    #[test]
    fn room_targets_for_unknown_room_are_empty() {
        let membership = MembershipTracker::new();
        assert!(room_targets(&membership, &room("void"), ConnectionId::new()).is_empty());
    }

    #[test]
    fn sender_outside_room_still_excluded_and_members_reached() {
        let mut membership = MembershipTracker::new();
        let member = ConnectionId::new();
        membership.join(member, room("general"));

        let targets = room_targets(&membership, &room("general"), ConnectionId::new());

        assert_eq!(targets, vec![member]);
    }

    #[test]
    fn direct_targets_include_recipient_and_sender() {
        let sender = ConnectionId::new();
        let recipient = ConnectionId::new();

        let targets = direct_targets(Some(recipient), sender);

        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&sender));
        assert!(targets.contains(&recipient));
    }

    #[test]
    fn direct_targets_without_recipient_only_echo() {
        let sender = ConnectionId::new();
        assert_eq!(direct_targets(None, sender), vec![sender]);
    }

    #[test]
    fn direct_message_to_self_delivers_once() {
        let sender = ConnectionId::new();
        assert_eq!(direct_targets(Some(sender), sender), vec![sender]);
    }

    #[test]
    fn display_name_prefers_requested_then_identity_then_connection() {
        let conn = ConnectionId::new();
        let alice = UserIdentity::new("alice").unwrap();

        assert_eq!(sender_display_name(Some("Alice A."), Some(&alice), conn), "Alice A.");
        assert_eq!(sender_display_name(Some("  "), Some(&alice), conn), "alice");
        assert_eq!(sender_display_name(None, None, conn), conn.to_string());
    }

    #[test]
    fn fan_out_counts_only_accepted_deliveries() {
        let (open_tx, mut open_rx) = mpsc::unbounded_channel::<RelayEvent>();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel::<RelayEvent>();
        drop(closed_rx);

        let open = ConnectionId::new();
        let closed = ConnectionId::new();
        let missing = ConnectionId::new();
        let mut sinks: HashMap<ConnectionId, Arc<dyn ConnectionSink>> = HashMap::new();
        sinks.insert(open, Arc::new(open_tx));
        sinks.insert(closed, Arc::new(closed_tx));

        let event = event();
        let delivered = fan_out(&[open, closed, missing], |id| sinks.get(id), &event);

        assert_eq!(delivered, 1);
        assert_eq!(open_rx.try_recv().unwrap(), event);
    }
}
