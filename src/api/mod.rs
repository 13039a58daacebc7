//! HTTP API route modules.

pub mod health;
pub mod webhooks;

use axum::Router;

/// Combined API router.
pub fn api_router() -> Router {
    Router::new()
        .merge(health::health_routes())
        .merge(webhooks::webhooks_routes())
}
