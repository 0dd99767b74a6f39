//! HTTP adapters - REST endpoints beside the WebSocket transport.

pub mod health;

pub use health::{health_router, HealthResponse};
