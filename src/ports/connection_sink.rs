//! ConnectionSink port - push relay events to one live connection.
//!
//! The relay never touches sockets. Each transport adapter hands the relay a
//! sink per accepted connection; the relay only asks it to deliver and
//! whether the other side is still there.

use tokio::sync::mpsc;

use crate::domain::relay::RelayEvent;

/// Outbound half of a single connection.
///
/// Implementations must not block: the relay delivers while holding its
/// state lock so that per-sender ordering is preserved.
pub trait ConnectionSink: Send + Sync {
    /// Queue an event for this connection. Returns false if the connection
    /// is already gone or cannot take more events right now.
    fn deliver(&self, event: RelayEvent) -> bool;

    /// False once the transport side has closed.
    fn is_open(&self) -> bool;
}

/// Channel-backed sink. The receiving half is typically a writer task that
/// owns the socket; tests read the receiver directly.
impl ConnectionSink for mpsc::UnboundedSender<RelayEvent> {
    fn deliver(&self, event: RelayEvent) -> bool {
        self.send(event).is_ok()
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use crate::domain::relay::Delivery;

    fn event() -> RelayEvent {
        RelayEvent::PrivateMessage {
            delivery: Delivery {
                content: "hi".to_string(),
                sender_display_name: "alice".to_string(),
                timestamp: Timestamp::now(),
            },
        }
    }

    #[test]
    fn channel_sink_delivers_while_receiver_alive() {
        let (tx, mut rx) = mpsc::unbounded_channel::<RelayEvent>();

        let event = event();
        assert!(tx.is_open());
        assert!(tx.deliver(event.clone()));
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn channel_sink_reports_closed_after_receiver_drop() {
        let (tx, rx) = mpsc::unbounded_channel::<RelayEvent>();
        drop(rx);

        assert!(!tx.is_open());
        assert!(!tx.deliver(event()));
    }
}
