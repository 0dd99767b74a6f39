//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid host address: {0}")]
    InvalidHost(String),

    #[error("Invalid persistence base URL format")]
    InvalidBaseUrl,

    #[error("Persistence request timeout must be between 1 and 60000 ms")]
    InvalidTimeout,

    #[error("Persistence queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("Persistence max_in_flight must be between 1 and 1024")]
    InvalidMaxInFlight,

    #[error("Relay max_content_bytes must be between 1 and 1048576")]
    InvalidContentLimit,

    #[error("Relay outbound_queue_capacity must be between 1 and 65536")]
    InvalidOutboundCapacity,

    #[error("Persistence base URL must use HTTPS in production")]
    BaseUrlMustBeHttps,
}
