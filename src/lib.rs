//! Chat Relay - real-time message relay for chat rooms and direct messages
//!
//! Clients connect over WebSocket, register a user identity, join rooms and
//! exchange messages. Delivery is in memory; every delivered message is then
//! recorded, best effort, in an external CRUD service.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
