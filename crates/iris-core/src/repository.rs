//! Repository traits - the persistence boundary
//!
//! The dispatch core and webhook processor never depend on a concrete
//! storage technology; they call these typed traits. `iris-store` provides
//! the SQLite implementations.

use crate::error::Result;
use crate::message::{InboundRecord, MessageStatus, OutboundRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Persistence for outbound and inbound messages.
///
/// Ownership rules: the dispatch core is the only writer of new outbound
/// records; the webhook processor is the only caller of [`apply_status`]
/// and the only writer of inbound records.
///
/// [`apply_status`]: MessageRepository::apply_status
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a new outbound record (already in its post-dispatch state).
    async fn create_outbound(&self, record: &OutboundRecord) -> Result<()>;

    /// Look up an outbound record by provider message id.
    async fn find_outbound_by_provider_id(&self, wa_id: &str) -> Result<Option<OutboundRecord>>;

    /// Apply a status transition to the outbound record with the given
    /// provider id, stamping the matching timestamp column.
    ///
    /// Returns `false` when no such record exists or the transition is not
    /// allowed from the record's current status (regressions are ignored,
    /// not errors — late callbacks are normal).
    async fn apply_status(
        &self,
        wa_id: &str,
        status: MessageStatus,
        at: DateTime<Utc>,
        error_details: Option<&str>,
        error_code: Option<i64>,
    ) -> Result<bool>;

    /// Persist a new inbound record.
    async fn create_inbound(&self, record: &InboundRecord) -> Result<()>;
}

/// One time-windowed analytics data point for a template.
///
/// Natural key: `(template_id, start, end)`. Metric fields are mutable under
/// upsert; a data point whose core metrics are all zero is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsPoint {
    /// Provider template id
    pub template_id: String,
    /// Window start (epoch seconds, UTC)
    pub start: i64,
    /// Window end (epoch seconds, UTC)
    pub end: i64,
    /// Messages sent in the window
    pub sent: i64,
    /// Messages delivered in the window
    pub delivered: i64,
    /// Messages read in the window
    pub read: i64,
}

impl AnalyticsPoint {
    /// Whether every core metric is zero (the skip policy predicate).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent == 0 && self.delivered == 0 && self.read == 0
    }
}

/// A click-count breakdown nested under a data point.
///
/// Natural key within the parent: `(click_type, button_content)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickBreakdown {
    /// Click type reported by the provider
    pub click_type: String,
    /// Button label, when the click is button-scoped
    pub button_content: Option<String>,
    /// Click count
    pub count: i64,
}

/// A cost breakdown nested under a data point.
///
/// Natural key within the parent: `cost_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown {
    /// Cost type reported by the provider
    pub cost_type: String,
    /// Cost value
    pub value: f64,
    /// ISO 4217 currency code
    pub currency: String,
}

/// Persistence for template analytics.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Idempotent upsert keyed by `(template_id, start, end)`.
    /// Returns the row id of the (new or existing) data point.
    async fn upsert_data_point(&self, point: &AnalyticsPoint) -> Result<i64>;

    /// Upsert a click breakdown under a data point, keyed by
    /// `(data_point_id, click_type, button_content)`.
    async fn upsert_click(&self, data_point_id: i64, click: &ClickBreakdown) -> Result<()>;

    /// Upsert a cost breakdown under a data point, keyed by
    /// `(data_point_id, cost_type)`.
    async fn upsert_cost(&self, data_point_id: i64, cost: &CostBreakdown) -> Result<()>;

    /// Look up a data point by its natural key.
    async fn find_data_point(
        &self,
        template_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Option<AnalyticsPoint>>;

    /// Raw data point row as JSON, for diagnostics endpoints.
    async fn data_point_json(
        &self,
        template_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Option<Value>>;
}
