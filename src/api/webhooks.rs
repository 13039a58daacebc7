//! Webhook handlers for the WhatsApp Cloud API

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use iris_core::{verify_subscription, GatewayConfig, WebhookNotification};
use std::sync::Arc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::processor::WebhookProcessor;

/// Webhook verification query
#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Verify the webhook subscription (GET)
///
/// Meta sends this request during webhook setup to verify ownership.
async fn whatsapp_verify(
    Query(query): Query<WebhookVerifyQuery>,
    Extension(config): Extension<Arc<GatewayConfig>>,
) -> impl IntoResponse {
    let mode = query.mode.as_deref().unwrap_or("");
    let token = query.verify_token.as_deref().unwrap_or("");
    let challenge = query.challenge.as_deref().unwrap_or("");

    match verify_subscription(mode, token, challenge, &config.webhook_verify_token) {
        Some(c) => {
            info!("webhook subscription verified");
            c.to_string().into_response()
        }
        None => {
            warn!("webhook verification failed");
            (StatusCode::FORBIDDEN, "Verification failed").into_response()
        }
    }
}

/// Handle a webhook delivery (POST)
///
/// Receives incoming messages and status updates from Meta.
async fn whatsapp_webhook(
    Extension(processor): Extension<Arc<WebhookProcessor>>,
    Json(notification): Json<WebhookNotification>,
) -> StatusCode {
    processor.process(&notification).await;

    // Always return 200 to avoid redelivery storms from Meta
    StatusCode::OK
}

/// Create webhook routes
pub fn webhooks_routes() -> Router {
    Router::new().route(
        "/api/v1/webhooks/whatsapp",
        get(whatsapp_verify).post(whatsapp_webhook),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_query_deserialize() {
        let query = "hub.mode=subscribe&hub.verify_token=test&hub.challenge=abc123";
        let parsed: WebhookVerifyQuery = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(parsed.mode.as_deref(), Some("subscribe"));
        assert_eq!(parsed.challenge.as_deref(), Some("abc123"));
    }
}
