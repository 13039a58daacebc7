//! Iris Core - Domain layer for the WhatsApp Cloud API gateway
//!
//! This crate holds everything that is independent of HTTP and storage:
//! - Error taxonomy and result alias
//! - Gateway configuration (explicit struct, injected — never global)
//! - Message domain types and status lifecycle
//! - Payload builders (pure input → wire-format JSON)
//! - Webhook envelope types and kind classification
//! - Repository traits implemented by `iris-store`
//! - Broadcast event bus for downstream consumers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod payload;
pub mod repository;
pub mod webhook;

pub use config::{GatewayConfig, RetryPolicy};
pub use error::{Error, Result};
pub use events::{EventBus, GatewayEvent};
pub use message::{from_api_status, InboundRecord, MessageKind, MessageStatus, OutboundRecord};
pub use payload::{MediaRef, ReplyButton};
pub use repository::{
    AnalyticsPoint, AnalyticsRepository, ClickBreakdown, CostBreakdown, MessageRepository,
};
pub use webhook::{
    classify_change, verify_subscription, WebhookChange, WebhookKind, WebhookNotification,
    WebhookStatus,
};
