//! In-memory message store.
//!
//! Used when `persistence.enabled` is false and throughout the tests. Can be
//! told to fail or to answer slowly to exercise the persistence bridge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::relay::MessageRecord;
use crate::ports::{MessageStore, PersistenceError};

/// Keeps every recorded message in a vector.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    records: Mutex<Vec<MessageRecord>>,
    attempts: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose every call fails as unreachable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Store that waits `delay` before recording.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Copy of everything recorded so far, in completion order.
    pub fn records(&self) -> Vec<MessageRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Calls made, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn record(&self, record: &MessageRecord) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(PersistenceError::Unreachable(
                "in-memory store configured to fail".to_string(),
            ));
        }

        self.records
            .lock()
            .map_err(|_| PersistenceError::Unreachable("store lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
