//! Relay configuration

use serde::Deserialize;

use super::error::ValidationError;

const MAX_CONTENT_LIMIT: usize = 1024 * 1024;
const MAX_OUTBOUND_CAPACITY: usize = 65_536;

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Largest accepted message body in bytes
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,

    /// Frames buffered per connection before deliveries to it are dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

impl RelayConfig {
    /// Validate relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_content_bytes == 0 || self.max_content_bytes > MAX_CONTENT_LIMIT {
            return Err(ValidationError::InvalidContentLimit);
        }
        if self.outbound_queue_capacity == 0
            || self.outbound_queue_capacity > MAX_OUTBOUND_CAPACITY
        {
            return Err(ValidationError::InvalidOutboundCapacity);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: default_max_content_bytes(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

fn default_max_content_bytes() -> usize {
    4096
}

fn default_outbound_queue_capacity() -> usize {
    256
}
