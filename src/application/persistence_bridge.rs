//! PersistenceBridge - decoupled durable recording of delivered messages.
//!
//! Delivery happens first, in memory. The relay then hands a `MessageRecord`
//! to the bridge, which queues it without blocking. A background worker
//! drains the queue and calls the `MessageStore`:
//!
//! ```text
//! Relay ──submit()──▶ bounded queue ──▶ PersistenceWorker ──▶ MessageStore
//!   (never waits)      (full = drop)     (≤ max_in_flight,      (HTTP)
//!                                          each call timed out)
//! ```
//!
//! Persistence is best effort and at most once. A record that is dropped,
//! times out, or fails is logged and counted; the recipient has already seen
//! the message live and nothing is retried.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `queue_capacity` | 1024 | Records waiting for a worker slot |
//! | `max_in_flight` | 32 | Concurrent store calls |
//! | `request_timeout` | 5s | Bound on a single store call |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

use crate::domain::relay::{MessageRecord, RelayError};
use crate::ports::{MessageStore, PersistenceError};

/// Configuration for the bridge and its worker.
#[derive(Debug, Clone)]
pub struct PersistenceSettings {
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub request_timeout: Duration,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: 32,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl PersistenceSettings {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Running counters for operator visibility.
#[derive(Debug, Default)]
struct PersistenceStats {
    submitted: AtomicU64,
    recorded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceCounters {
    pub submitted: u64,
    pub recorded: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Handle used by the relay to queue records. Cheap to clone.
#[derive(Clone)]
pub struct PersistenceBridge {
    tx: mpsc::Sender<MessageRecord>,
    stats: Arc<PersistenceStats>,
}

impl PersistenceBridge {
    /// Creates the bridge handle and the worker that must be spawned to drain it.
    pub fn new(
        store: Arc<dyn MessageStore>,
        settings: PersistenceSettings,
    ) -> (Self, PersistenceWorker) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let stats = Arc::new(PersistenceStats::default());

        let bridge = Self {
            tx,
            stats: stats.clone(),
        };
        let worker = PersistenceWorker {
            rx,
            store,
            settings,
            stats,
        };
        (bridge, worker)
    }

    /// Queues a record without waiting.
    ///
    /// # Errors
    ///
    /// `PersistenceUnavailable` when the queue is full or the worker has
    /// stopped. The record is dropped in both cases.
    pub fn submit(&self, record: MessageRecord) -> Result<(), RelayError> {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    destination = ?record.destination,
                    "Persistence queue full, message dropped from history"
                );
                Err(RelayError::persistence_unavailable("persistence queue full"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(RelayError::persistence_unavailable(
                    "persistence worker stopped",
                ))
            }
        }
    }

    pub fn counters(&self) -> PersistenceCounters {
        PersistenceCounters {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            recorded: self.stats.recorded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Makes one bounded store call and maps every failure to
/// `PersistenceUnavailable`.
pub async fn record_with_timeout(
    store: &dyn MessageStore,
    record: &MessageRecord,
    timeout: Duration,
) -> Result<(), RelayError> {
    let outcome = match tokio::time::timeout(timeout, store.record(record)).await {
        Ok(result) => result,
        Err(_) => Err(PersistenceError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    };
    outcome.map_err(|e| RelayError::persistence_unavailable(e.to_string()))
}

/// Background task draining the bridge queue into the message store.
pub struct PersistenceWorker {
    rx: mpsc::Receiver<MessageRecord>,
    store: Arc<dyn MessageStore>,
    settings: PersistenceSettings,
    stats: Arc<PersistenceStats>,
}

impl PersistenceWorker {
    /// Runs until shutdown is signalled or every bridge handle is dropped,
    /// then drains what is already queued and waits for in-flight calls.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.settings.max_in_flight.max(1)));
        let mut in_flight = JoinSet::new();

        tracing::info!(store = self.store.name(), "Persistence worker started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = self.rx.recv() => match next {
                    Some(record) => self.dispatch(record, &permits, &mut in_flight).await,
                    None => break,
                },
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        self.rx.close();
        let mut drained = 0usize;
        while let Some(record) = self.rx.recv().await {
            self.dispatch(record, &permits, &mut in_flight).await;
            drained += 1;
        }
        while in_flight.join_next().await.is_some() {}

        tracing::info!(
            store = self.store.name(),
            drained,
            "Persistence worker stopped"
        );
    }

    async fn dispatch(
        &self,
        record: MessageRecord,
        permits: &Arc<Semaphore>,
        in_flight: &mut JoinSet<()>,
    ) {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            return;
        };
        let store = self.store.clone();
        let stats = self.stats.clone();
        let timeout = self.settings.request_timeout;

        in_flight.spawn(async move {
            let _permit = permit;
            match record_with_timeout(store.as_ref(), &record, timeout).await {
                Ok(()) => {
                    stats.recorded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(destination = ?record.destination, "Message recorded");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        destination = ?record.destination,
                        error = %e,
                        "Failed to record message, lost from history"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::InMemoryMessageStore;
    use crate::domain::foundation::{ErrorCode, RoomId, Timestamp};
    use crate::domain::relay::Destination;

    fn record(content: &str) -> MessageRecord {
        MessageRecord {
            destination: Destination::Room(RoomId::new("general").unwrap()),
            content: content.to_string(),
            sender: "alice".to_string(),
            timestamp: Timestamp::now(),
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn worker_records_submitted_messages() {
        let store = Arc::new(InMemoryMessageStore::new());
        let (bridge, worker) = PersistenceBridge::new(store.clone(), PersistenceSettings::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(worker.run(shutdown_rx));

        bridge.submit(record("one")).unwrap();
        bridge.submit(record("two")).unwrap();

        wait_for(|| store.count() == 2).await;
        wait_for(|| bridge.counters().recorded == 2).await;
        assert_eq!(bridge.counters().submitted, 2);
    }

    #[tokio::test]
    async fn store_failure_is_counted_not_propagated() {
        let store = Arc::new(InMemoryMessageStore::failing());
        let (bridge, worker) = PersistenceBridge::new(store.clone(), PersistenceSettings::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(worker.run(shutdown_rx));

        assert!(bridge.submit(record("lost")).is_ok());

        wait_for(|| bridge.counters().failed == 1).await;
        assert_eq!(store.count(), 0);
        assert_eq!(store.attempts(), 1);
    }

    #[tokio::test]
    async fn slow_store_times_out_as_unavailable() {
        let store = InMemoryMessageStore::with_delay(Duration::from_millis(200));

        let err = record_with_timeout(&store, &record("slow"), Duration::from_millis(20))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::PersistenceUnavailable);
        assert!(err.to_string().contains("timed out after 20ms"));
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let store = Arc::new(InMemoryMessageStore::new());
        let settings = PersistenceSettings::default().with_queue_capacity(1);
        // Worker never spawned, so the queue stays full after one record.
        let (bridge, _worker) = PersistenceBridge::new(store, settings);

        bridge.submit(record("queued")).unwrap();
        let err = bridge.submit(record("dropped")).unwrap_err();

        assert_eq!(err.code(), ErrorCode::PersistenceUnavailable);
        assert_eq!(bridge.counters().dropped, 1);
        assert_eq!(bridge.counters().submitted, 1);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_records() {
        let store = Arc::new(InMemoryMessageStore::new());
        let (bridge, worker) = PersistenceBridge::new(store.clone(), PersistenceSettings::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for i in 0..5 {
            bridge.submit(record(&format!("msg-{}", i))).unwrap();
        }
        shutdown_tx.send(true).unwrap();
        worker.run(shutdown_rx).await;

        assert_eq!(store.count(), 5);
    }

    #[tokio::test]
    async fn submit_after_worker_stops_is_unavailable() {
        let store = Arc::new(InMemoryMessageStore::new());
        let (bridge, worker) = PersistenceBridge::new(store, PersistenceSettings::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();
        worker.run(shutdown_rx).await;

        let err = bridge.submit(record("late")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PersistenceUnavailable);
    }
}
