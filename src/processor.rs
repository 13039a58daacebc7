//! Webhook processor
//!
//! Turns a parsed webhook notification into persisted records and bus
//! events. Processing is fault-isolated per change: one malformed change is
//! logged and skipped, never failing the batch (the HTTP handler answers
//! 200 regardless, so a processing error here must not cause redelivery
//! storms).

use chrono::{DateTime, Utc};
use iris_core::{
    classify_change, from_api_status, EventBus, GatewayEvent, InboundRecord, MessageRepository,
    Result, WebhookChange, WebhookKind, WebhookNotification, WebhookStatus,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters describing one processed notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Inbound messages persisted
    pub messages_stored: usize,
    /// Status callbacks applied to outbound records
    pub statuses_applied: usize,
    /// Status callbacks ignored (unknown message or disallowed transition)
    pub statuses_ignored: usize,
    /// Changes classified as system notifications
    pub system_notifications: usize,
    /// Channel-level errors reported on change values
    pub channel_errors: usize,
}

/// Stateless webhook processor over a repository and an event bus.
#[derive(Clone)]
pub struct WebhookProcessor {
    repository: Arc<dyn MessageRepository>,
    event_bus: Arc<EventBus>,
}

impl WebhookProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(repository: Arc<dyn MessageRepository>, event_bus: Arc<EventBus>) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// Process every change in a notification.
    #[tracing::instrument(skip_all, fields(entries = notification.entry.len()))]
    pub async fn process(&self, notification: &WebhookNotification) -> ProcessSummary {
        let mut summary = ProcessSummary::default();

        for entry in &notification.entry {
            for change in &entry.changes {
                // Channel-level errors ride alongside whatever else the
                // change carries; surface them without consuming the change.
                for error in &change.value.errors {
                    warn!(
                        code = error.code,
                        title = %error.title,
                        message = %error.message,
                        "channel error reported"
                    );
                    summary.channel_errors += 1;
                }

                match classify_change(change) {
                    WebhookKind::StatusUpdate => {
                        self.process_statuses(change, &mut summary).await;
                    }
                    WebhookKind::IncomingMessage => {
                        self.process_messages(change, &mut summary).await;
                    }
                    WebhookKind::SystemNotification => {
                        debug!(field = %change.field, "system notification");
                        summary.system_notifications += 1;
                    }
                }
            }
        }

        info!(
            messages = summary.messages_stored,
            statuses = summary.statuses_applied,
            ignored = summary.statuses_ignored,
            "webhook processed"
        );
        summary
    }

    async fn process_statuses(&self, change: &WebhookChange, summary: &mut ProcessSummary) {
        for status in &change.value.statuses {
            match self.apply_one_status(status).await {
                Ok(true) => {
                    summary.statuses_applied += 1;
                    self.event_bus.publish(GatewayEvent::MessageStatusChanged {
                        wa_id: status.id.clone(),
                        status: from_api_status(&status.status),
                    });
                }
                Ok(false) => summary.statuses_ignored += 1,
                Err(e) => {
                    warn!(wa_id = %status.id, error = %e, "status callback failed");
                    summary.statuses_ignored += 1;
                }
            }
        }
    }

    async fn apply_one_status(&self, status: &WebhookStatus) -> Result<bool> {
        let next = from_api_status(&status.status);
        let at = parse_epoch(&status.timestamp);

        let first_error = status.errors.first();
        let error_details = first_error.map(|e| {
            if e.message.is_empty() {
                e.title.clone()
            } else {
                e.message.clone()
            }
        });
        let error_code = first_error.map(|e| e.code);

        self.repository
            .apply_status(&status.id, next, at, error_details.as_deref(), error_code)
            .await
    }

    async fn process_messages(&self, change: &WebhookChange, summary: &mut ProcessSummary) {
        for message in &change.value.messages {
            let mut record = InboundRecord::new(
                &message.id,
                &message.from,
                message.kind(),
                message.content_extract(),
                serde_json::to_value(message).unwrap_or_default(),
            );

            // Sender profile name travels in the sibling contacts array.
            let sender_name = change
                .value
                .contacts
                .iter()
                .find(|c| c.wa_id == message.from)
                .and_then(|c| c.profile.as_ref())
                .map(|p| p.name.clone());
            if let Some(name) = sender_name {
                record = record.with_sender_name(name);
            }
            if let Some(context) = &message.context {
                record = record.with_context(&context.id);
            }

            match self.repository.create_inbound(&record).await {
                Ok(()) => {
                    summary.messages_stored += 1;
                    self.event_bus.publish(GatewayEvent::MessageReceived {
                        record_id: record.id,
                        wa_id: record.wa_id.clone(),
                        from: record.from.clone(),
                        content: record.message_content.clone(),
                    });
                }
                Err(e) => {
                    warn!(wa_id = %message.id, error = %e, "inbound message not stored");
                }
            }
        }
    }
}

/// Parse the provider's stringified epoch-seconds timestamp; an absent or
/// malformed timestamp falls back to the processing time.
fn parse_epoch(value: &str) -> DateTime<Utc> {
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}
