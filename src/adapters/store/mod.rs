//! Message store adapters.
//!
//! - [`HttpMessageStore`] - records messages through the CRUD service's REST API
//! - [`InMemoryMessageStore`] - keeps records in process (development, tests)

mod http_message_store;
mod in_memory_message_store;

pub use http_message_store::{HttpMessageStore, HttpMessageStoreConfig};
pub use in_memory_message_store::InMemoryMessageStore;
