//! HTTP Message Store - records delivered messages in the CRUD service.
//!
//! # Endpoints
//!
//! | Destination | Request |
//! |-------------|---------|
//! | Room | `POST {base_url}/message/{chatroomId}` |
//! | User | `POST {base_url}/message/direct/{recipientUserIdentity}` |
//!
//! Body: `{"content": ..., "timestamp": ..., "sender": ...}`. Any 2xx status
//! counts as recorded.
//!
//! # Configuration
//!
//! ```ignore
//! let config = HttpMessageStoreConfig::new("http://localhost:3000")
//!     .with_api_token(token)
//!     .with_timeout(Duration::from_secs(5));
//!
//! let store = HttpMessageStore::new(config)?;
//! ```

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;

use crate::domain::relay::{Destination, MessageRecord};
use crate::ports::{MessageStore, PersistenceError};

/// Configuration for the HTTP message store.
#[derive(Debug, Clone)]
pub struct HttpMessageStoreConfig {
    /// Base URL of the CRUD service, without trailing slash.
    pub base_url: String,
    /// Bearer token, if the CRUD service requires one.
    api_token: Option<Secret<String>>,
    /// Request timeout.
    pub timeout: Duration,
}

impl HttpMessageStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            timeout: Duration::from_secs(5),
        }
    }

    /// Sets the bearer token.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(Secret::new(token.into()));
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_token(&self) -> Option<&str> {
        self.api_token.as_ref().map(|t| t.expose_secret().as_str())
    }
}

/// Request body expected by the CRUD service.
#[derive(Debug, Serialize)]
struct RecordMessageBody<'a> {
    content: &'a str,
    timestamp: String,
    sender: &'a str,
}

/// Message store backed by the CRUD service's REST API.
pub struct HttpMessageStore {
    config: HttpMessageStoreConfig,
    client: Client,
}

impl HttpMessageStore {
    /// # Errors
    ///
    /// `Unreachable` if the HTTP client cannot be built.
    pub fn new(config: HttpMessageStoreConfig) -> Result<Self, PersistenceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PersistenceError::Unreachable(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Endpoint for a destination. Path segments are percent-encoded.
    fn endpoint(&self, destination: &Destination) -> Result<reqwest::Url, PersistenceError> {
        let mut url = reqwest::Url::parse(&self.config.base_url)
            .map_err(|e| PersistenceError::Unreachable(format!("invalid base URL: {}", e)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                PersistenceError::Unreachable("base URL cannot carry a path".to_string())
            })?;
            segments.pop_if_empty().push("message");
            match destination {
                Destination::Room(room_id) => {
                    segments.push(room_id.as_str());
                }
                Destination::User(user) => {
                    segments.push("direct").push(user.as_str());
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl MessageStore for HttpMessageStore {
    async fn record(&self, record: &MessageRecord) -> Result<(), PersistenceError> {
        let url = self.endpoint(&record.destination)?;
        let body = RecordMessageBody {
            content: &record.content,
            timestamp: record.timestamp.to_rfc3339(),
            sender: &record.sender,
        };

        let mut request = self.client.post(url).json(&body);
        if let Some(token) = self.config.api_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PersistenceError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                }
            } else if e.is_connect() {
                PersistenceError::Unreachable(format!("Connection failed: {}", e))
            } else {
                PersistenceError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{RoomId, UserIdentity};

    fn store(base_url: &str) -> HttpMessageStore {
        HttpMessageStore::new(HttpMessageStoreConfig::new(base_url)).unwrap()
    }

    #[test]
    fn room_endpoint_uses_chatroom_id() {
        let url = store("http://localhost:3000")
            .endpoint(&Destination::Room(RoomId::new("42").unwrap()))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/message/42");
    }

    #[test]
    fn direct_endpoint_is_namespaced() {
        let url = store("http://localhost:3000/api/")
            .endpoint(&Destination::User(UserIdentity::new("bob").unwrap()))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/message/direct/bob");
    }

    #[test]
    fn path_segments_are_encoded() {
        let url = store("http://localhost:3000")
            .endpoint(&Destination::Room(RoomId::new("a/b c").unwrap()))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/message/a%2Fb%20c");
    }

    #[test]
    fn config_builder_sets_token_and_timeout() {
        let config = HttpMessageStoreConfig::new("http://crud/")
            .with_api_token("secret-token")
            .with_timeout(Duration::from_millis(250));

        assert_eq!(config.base_url, "http://crud");
        assert_eq!(config.api_token(), Some("secret-token"));
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(!format!("{:?}", config).contains("secret-token"));
    }
}
