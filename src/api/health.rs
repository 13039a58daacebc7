//! Health check endpoint.

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use iris_core::EventBus;
use serde::Serialize;
use std::sync::Arc;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub event_subscribers: usize,
}

/// Simple health check (for load balancers)
async fn health_check(Extension(bus): Extension<Arc<EventBus>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        event_subscribers: bus.subscriber_count(),
    })
}

/// Create health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_check))
}
