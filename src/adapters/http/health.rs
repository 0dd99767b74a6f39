//! Health endpoint.
//!
//! `GET /health` reports live relay counts and persistence bridge counters.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::application::{PersistenceCounters, Relay, RelaySnapshot};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub relay: RelaySnapshot,
    pub persistence: PersistenceCounters,
}

pub async fn health_check(State(relay): State<Arc<Relay>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        relay: relay.snapshot().await,
        persistence: relay.persistence_counters(),
    })
}

pub fn health_router() -> Router<Arc<Relay>> {
    Router::new().route("/health", get(health_check))
}
