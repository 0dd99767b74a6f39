use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use http::HeaderValue;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chat_relay::adapters::http::health_router;
use chat_relay::adapters::{
    websocket_router, HttpMessageStore, HttpMessageStoreConfig, InMemoryMessageStore,
    WebSocketState,
};
use chat_relay::application::{PersistenceBridge, PersistenceSettings, Relay, RelaySettings};
use chat_relay::config::AppConfig;
use chat_relay::ports::MessageStore;

/// Time open sockets get to disconnect before the persistence queue drains.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    tracing::info!("chat-relay v{} starting", env!("CARGO_PKG_VERSION"));

    let store = build_store(&config)?;
    let settings = PersistenceSettings::default()
        .with_queue_capacity(config.persistence.queue_capacity)
        .with_max_in_flight(config.persistence.max_in_flight)
        .with_request_timeout(config.persistence.request_timeout());
    let (bridge, worker) = PersistenceBridge::new(store, settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let relay = Arc::new(Relay::new(
        bridge,
        RelaySettings {
            max_content_bytes: config.relay.max_content_bytes,
        },
    ));

    // Upgraded sockets are not tracked by graceful shutdown, so they get
    // their own signal.
    let (close_tx, close_rx) = watch::channel(false);
    let ws_state = WebSocketState::new(relay.clone())
        .with_outbound_capacity(config.relay.outbound_queue_capacity)
        .with_shutdown(close_rx);

    let app = Router::new()
        .merge(websocket_router().with_state(ws_state))
        .merge(health_router().with_state(relay.clone()))
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, closing open connections");
    let _ = close_tx.send(true);
    if !wait_for_disconnects(&relay, CONNECTION_DRAIN_TIMEOUT).await {
        tracing::warn!(
            remaining = relay.snapshot().await.connections,
            "Connections still open after drain timeout"
        );
    }

    tracing::info!("Draining persistence queue");
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Persistence worker panicked");
    }

    Ok(())
}

/// True once every connection has been disconnected within `limit`.
async fn wait_for_disconnects(relay: &Relay, limit: Duration) -> bool {
    let drained = async {
        while relay.snapshot().await.connections > 0 {
            sleep(Duration::from_millis(50)).await;
        }
    };
    timeout(limit, drained).await.is_ok()
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.server.log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_store(config: &AppConfig) -> Result<Arc<dyn MessageStore>, Box<dyn std::error::Error>> {
    if !config.persistence.enabled {
        tracing::warn!("Persistence disabled, messages are kept in memory only");
        return Ok(Arc::new(InMemoryMessageStore::new()));
    }

    let mut store_config = HttpMessageStoreConfig::new(&config.persistence.base_url)
        .with_timeout(config.persistence.request_timeout());
    if let Some(token) = &config.persistence.api_token {
        store_config = store_config.with_api_token(token);
    }

    tracing::info!(base_url = %store_config.base_url, "Recording messages via HTTP store");
    Ok(Arc::new(HttpMessageStore::new(store_config)?))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
