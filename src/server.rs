//! Server module
//!
//! Router composition and runtime wiring: config from environment, SQLite
//! store, event bus, and the webhook processor, all injected as Extension
//! state.

use anyhow::{Context, Result};
use axum::{routing::get, Extension, Router};
use iris_core::{EventBus, GatewayConfig};
use iris_store::SqliteStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::processor::WebhookProcessor;

/// Default data directory, overridable with `IRIS_DATA_DIR`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("IRIS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

/// Build the application router over shared state.
pub fn build_router(
    config: Arc<GatewayConfig>,
    processor: Arc<WebhookProcessor>,
    event_bus: Arc<EventBus>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "iris gateway" }))
        .merge(crate::api::api_router())
        .layer(Extension(config))
        .layer(Extension(processor))
        .layer(Extension(event_bus))
        .layer(TraceLayer::new_for_http())
}

/// Run the webhook server.
pub async fn run(host: &str, port: u16) -> Result<()> {
    info!("Starting iris gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(GatewayConfig::from_env().context("Failed to load configuration")?);
    info!(
        phone_number_id = %config.phone_number_id,
        api_version = %config.api_version,
        "Configuration loaded"
    );

    let db_path = default_data_dir().join("iris.db");
    let store = Arc::new(
        SqliteStore::from_path(&db_path)
            .await
            .context("Failed to initialize SQLite store")?,
    );

    let event_bus = Arc::new(EventBus::new(256));
    info!("EventBus initialized (capacity: 256)");

    let processor = Arc::new(WebhookProcessor::new(store, event_bus.clone()));

    let app = build_router(config, processor, event_bus);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("Invalid server address")?;

    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("iris shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
