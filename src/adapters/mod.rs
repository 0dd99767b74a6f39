//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the relay to external systems:
//! - `websocket` - client transport (axum WebSocket)
//! - `store` - message store implementations (HTTP, in-memory)
//! - `http` - operational endpoints

pub mod http;
pub mod store;
pub mod websocket;

pub use store::{HttpMessageStore, HttpMessageStoreConfig, InMemoryMessageStore};
pub use websocket::{websocket_router, WebSocketState};
