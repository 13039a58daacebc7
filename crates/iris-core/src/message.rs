//! Message domain types and status lifecycle
//!
//! An outbound message is a persisted event: exactly one record is written
//! per dispatch attempt, whether or not the provider accepted it. Status
//! transitions after that are driven exclusively by webhook status callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message kind on the wire (`type` field of the Cloud API payload)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text
    Text,
    /// Image with optional caption
    Image,
    /// Document with optional caption and filename
    Document,
    /// Audio clip
    Audio,
    /// Video with optional caption
    Video,
    /// Sticker
    Sticker,
    /// Pre-approved template
    Template,
    /// Location pin
    Location,
    /// Interactive message (buttons / list)
    Interactive,
    /// Emoji reaction to an existing message
    Reaction,
    /// Anything the gateway does not model
    Unknown,
}

impl MessageKind {
    /// Wire representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Sticker => "sticker",
            Self::Template => "template",
            Self::Location => "location",
            Self::Interactive => "interactive",
            Self::Reaction => "reaction",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a provider `type` string. Unrecognized values map to
    /// [`MessageKind::Unknown`] so a new provider type never fails a batch.
    #[must_use]
    pub fn from_api_type(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "image" => Self::Image,
            "document" => Self::Document,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "sticker" => Self::Sticker,
            "template" => Self::Template,
            "location" => Self::Location,
            "interactive" => Self::Interactive,
            "reaction" => Self::Reaction,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an outbound message.
///
/// `Pending → Sent → Delivered → Read` is the happy path; `Failed` can be
/// entered from any non-terminal state. `Read` and `Failed` are terminal —
/// once reached, no callback may regress the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Built but not yet accepted by the provider
    Pending,
    /// Accepted by the provider (it returned a message id)
    Sent,
    /// Delivered to the recipient device
    Delivered,
    /// Read by the recipient
    Read,
    /// Rejected by the provider, or a failure callback arrived
    Failed,
}

impl MessageStatus {
    /// Wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    /// Whether this status is terminal (no further transitions allowed).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }

    /// Rank in the delivery progression, used to reject regressions.
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// Terminal statuses accept nothing; otherwise the status may only move
    /// forward in the progression (or to `Failed`).
    #[must_use]
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map a provider status string to a [`MessageStatus`].
///
/// Unrecognized strings map to `Pending` rather than erroring: one unknown
/// status in a webhook batch must never fail the whole batch.
#[must_use]
pub fn from_api_status(value: &str) -> MessageStatus {
    match value.to_ascii_lowercase().as_str() {
        "sent" => MessageStatus::Sent,
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        "failed" => MessageStatus::Failed,
        _ => MessageStatus::Pending,
    }
}

/// A persisted outbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRecord {
    /// Internal record id
    pub id: Uuid,
    /// Provider message id (`wamid.*`), absent until the provider accepts
    pub wa_id: Option<String>,
    /// Recipient phone number
    pub to: String,
    /// Message kind
    pub kind: MessageKind,
    /// Human-readable content extract (text body, caption, template name)
    pub message_content: String,
    /// Full wire payload as sent (opaque JSON)
    pub payload: Value,
    /// Lifecycle status
    pub status: MessageStatus,
    /// Error message captured on failure
    pub error_details: Option<String>,
    /// Provider error code captured on failure
    pub error_code: Option<i64>,
    /// Provider id of the message this one replies to
    pub context_wa_id: Option<String>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the provider accepted the message
    pub sent_at: Option<DateTime<Utc>>,
    /// When the delivered callback arrived
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the read callback arrived
    pub read_at: Option<DateTime<Utc>>,
    /// When dispatch failed or a failure callback arrived
    pub failed_at: Option<DateTime<Utc>>,
}

impl OutboundRecord {
    /// Record for a message the provider accepted.
    #[must_use]
    pub fn sent(
        wa_id: impl Into<String>,
        to: impl Into<String>,
        kind: MessageKind,
        message_content: impl Into<String>,
        payload: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            wa_id: Some(wa_id.into()),
            to: to.into(),
            kind,
            message_content: message_content.into(),
            payload,
            status: MessageStatus::Sent,
            error_details: None,
            error_code: None,
            context_wa_id: None,
            created_at: now,
            sent_at: Some(now),
            delivered_at: None,
            read_at: None,
            failed_at: None,
        }
    }

    /// Record for a message the provider rejected (or that never reached it).
    #[must_use]
    pub fn failed(
        to: impl Into<String>,
        kind: MessageKind,
        message_content: impl Into<String>,
        payload: Value,
        error_details: impl Into<String>,
        error_code: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            wa_id: None,
            to: to.into(),
            kind,
            message_content: message_content.into(),
            payload,
            status: MessageStatus::Failed,
            error_details: Some(error_details.into()),
            error_code,
            context_wa_id: None,
            created_at: now,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            failed_at: Some(now),
        }
    }

    /// Set the reply context.
    #[must_use]
    pub fn with_context(mut self, wa_id: impl Into<String>) -> Self {
        self.context_wa_id = Some(wa_id.into());
        self
    }
}

/// A persisted inbound message (created from webhook delivery)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundRecord {
    /// Internal record id
    pub id: Uuid,
    /// Provider message id
    pub wa_id: String,
    /// Sender phone number
    pub from: String,
    /// Sender profile name, when the webhook carried one
    pub sender_name: Option<String>,
    /// Message kind
    pub kind: MessageKind,
    /// Extracted content (text body or a `[kind]` placeholder)
    pub message_content: String,
    /// Raw webhook message object
    pub payload: Value,
    /// Provider id of the message this one replies to
    pub context_wa_id: Option<String>,
    /// When the gateway received it
    pub received_at: DateTime<Utc>,
}

impl InboundRecord {
    /// Create an inbound record received now.
    #[must_use]
    pub fn new(
        wa_id: impl Into<String>,
        from: impl Into<String>,
        kind: MessageKind,
        message_content: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wa_id: wa_id.into(),
            from: from.into(),
            sender_name: None,
            kind,
            message_content: message_content.into(),
            payload,
            context_wa_id: None,
            received_at: Utc::now(),
        }
    }

    /// Set the sender profile name.
    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Set the reply context.
    #[must_use]
    pub fn with_context(mut self, wa_id: impl Into<String>) -> Self {
        self.context_wa_id = Some(wa_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api_status_known_values() {
        assert_eq!(from_api_status("sent"), MessageStatus::Sent);
        assert_eq!(from_api_status("delivered"), MessageStatus::Delivered);
        assert_eq!(from_api_status("read"), MessageStatus::Read);
        assert_eq!(from_api_status("failed"), MessageStatus::Failed);
        assert_eq!(from_api_status("READ"), MessageStatus::Read);
    }

    #[test]
    fn test_from_api_status_unknown_maps_to_pending() {
        assert_eq!(from_api_status("UNKNOWN_FOO"), MessageStatus::Pending);
        assert_eq!(from_api_status(""), MessageStatus::Pending);
        assert_eq!(from_api_status("warned"), MessageStatus::Pending);
    }

    #[test]
    fn test_transitions_forward_only() {
        assert!(MessageStatus::Pending.can_transition_to(MessageStatus::Sent));
        assert!(MessageStatus::Sent.can_transition_to(MessageStatus::Delivered));
        assert!(MessageStatus::Sent.can_transition_to(MessageStatus::Read));
        assert!(MessageStatus::Delivered.can_transition_to(MessageStatus::Read));
        assert!(MessageStatus::Sent.can_transition_to(MessageStatus::Failed));

        assert!(!MessageStatus::Delivered.can_transition_to(MessageStatus::Sent));
        assert!(!MessageStatus::Sent.can_transition_to(MessageStatus::Pending));
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        assert!(!MessageStatus::Read.can_transition_to(MessageStatus::Failed));
        assert!(!MessageStatus::Read.can_transition_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Failed.can_transition_to(MessageStatus::Sent));
        assert!(!MessageStatus::Failed.can_transition_to(MessageStatus::Read));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(MessageKind::from_api_type("text"), MessageKind::Text);
        assert_eq!(MessageKind::from_api_type("reaction"), MessageKind::Reaction);
        assert_eq!(MessageKind::from_api_type("hologram"), MessageKind::Unknown);
    }

    #[test]
    fn test_sent_record_shape() {
        let record = OutboundRecord::sent(
            "wamid.ABC",
            "+14155551234",
            MessageKind::Text,
            "hello",
            serde_json::json!({"type": "text"}),
        );
        assert_eq!(record.status, MessageStatus::Sent);
        assert_eq!(record.wa_id.as_deref(), Some("wamid.ABC"));
        assert!(record.sent_at.is_some());
        assert!(record.failed_at.is_none());
    }

    #[test]
    fn test_failed_record_shape() {
        let record = OutboundRecord::failed(
            "+14155551234",
            MessageKind::Text,
            "hello",
            serde_json::json!({"type": "text"}),
            "network error: timeout",
            None,
        );
        assert_eq!(record.status, MessageStatus::Failed);
        assert!(record.wa_id.is_none());
        assert_eq!(record.error_details.as_deref(), Some("network error: timeout"));
        assert!(record.failed_at.is_some());
    }
}
