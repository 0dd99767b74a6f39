//! Domain layer - relay state and vocabulary.
//!
//! - `foundation` - identifiers, timestamps, errors, state machine trait
//! - `relay` - registry, membership, message types

pub mod foundation;
pub mod relay;
