//! Persistence configuration (message store endpoint and bridge tuning)

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const MAX_TIMEOUT_MS: u64 = 60_000;
const MAX_IN_FLIGHT: usize = 1024;

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// When false, messages are kept in memory only (development)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base URL of the CRUD service that owns message history
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional bearer token sent to the CRUD service
    pub api_token: Option<String>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Records waiting for a worker slot before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Concurrent store calls
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl PersistenceConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate persistence configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.request_timeout_ms == 0 || self.request_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        if self.max_in_flight == 0 || self.max_in_flight > MAX_IN_FLIGHT {
            return Err(ValidationError::InvalidMaxInFlight);
        }
        if !self.enabled {
            return Ok(());
        }
        if self.base_url.is_empty() {
            return Err(ValidationError::MissingRequired("PERSISTENCE__BASE_URL"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidBaseUrl);
        }
        if production && !self.base_url.starts_with("https://") {
            return Err(ValidationError::BaseUrlMustBeHttps);
        }
        Ok(())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: default_base_url(),
            api_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    32
}
