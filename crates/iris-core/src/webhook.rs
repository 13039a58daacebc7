//! Webhook envelope types and kind classification
//!
//! Meta delivers events as `notification → entry[] → changes[] → value`.
//! The value object has no explicit discriminator; the kind of a change is
//! inferred from its shape. The exact rules live in [`classify_change`] and
//! are a versioned contract — if the provider changes payload shapes, that
//! function is the single place to update.

use crate::message::MessageKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level webhook notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotification {
    /// Object type, `whatsapp_business_account` for this gateway
    #[serde(default)]
    pub object: String,
    /// Entry array, one per business account
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

/// A single entry in the notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntry {
    /// Business Account ID
    #[serde(default)]
    pub id: String,
    /// Changes array
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

/// A change within an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChange {
    /// Field name (`messages` for the message webhooks)
    #[serde(default)]
    pub field: String,
    /// Value payload carrying the actual event data
    pub value: WebhookValue,
}

/// The value object carrying messages, statuses, contacts, and metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookValue {
    /// Messaging product, `whatsapp`
    #[serde(default)]
    pub messaging_product: String,
    /// Receiving phone number metadata
    #[serde(default)]
    pub metadata: Option<WebhookMetadata>,
    /// Sender contact info
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    /// Inbound messages
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
    /// Delivery status updates for previously sent messages
    #[serde(default)]
    pub statuses: Vec<WebhookStatus>,
    /// Channel-level errors the provider reports out of band
    #[serde(default)]
    pub errors: Vec<WebhookError>,
}

/// Metadata about the receiving phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMetadata {
    /// Display phone number
    #[serde(default)]
    pub display_phone_number: String,
    /// Phone number ID
    #[serde(default)]
    pub phone_number_id: String,
}

/// Sender contact info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookContact {
    /// Profile info
    pub profile: Option<WebhookProfile>,
    /// Sender phone number
    #[serde(default)]
    pub wa_id: String,
}

/// Sender profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookProfile {
    /// Display name
    #[serde(default)]
    pub name: String,
}

/// An inbound message from the webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMessage {
    /// Sender phone number
    #[serde(default)]
    pub from: String,
    /// Provider message id
    #[serde(default)]
    pub id: String,
    /// Unix timestamp as string
    #[serde(default)]
    pub timestamp: String,
    /// Message type: `text`, `image`, `reaction`, ...
    #[serde(default, rename = "type")]
    pub message_type: String,
    /// Text content (type = `text`)
    pub text: Option<WebhookText>,
    /// Reply context, when the user replied to an earlier message
    pub context: Option<WebhookContext>,
    /// Everything else (media objects, button replies) kept opaque
    #[serde(flatten)]
    pub rest: Value,
}

/// Text content within a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookText {
    /// Message body
    #[serde(default)]
    pub body: String,
}

/// Reply context within a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookContext {
    /// Provider id of the message being replied to
    #[serde(default)]
    pub id: String,
}

/// A delivery status update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookStatus {
    /// Provider message id the status refers to
    #[serde(default)]
    pub id: String,
    /// Status string: `sent`, `delivered`, `read`, `failed`
    #[serde(default)]
    pub status: String,
    /// Unix timestamp as string
    #[serde(default)]
    pub timestamp: String,
    /// Recipient phone number
    #[serde(default)]
    pub recipient_id: String,
    /// Failure detail, present when status = `failed`
    #[serde(default)]
    pub errors: Vec<WebhookError>,
}

/// An error object the provider attaches to statuses or change values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookError {
    /// Provider error code
    #[serde(default)]
    pub code: i64,
    /// Error title
    #[serde(default)]
    pub title: String,
    /// Error message, when present
    #[serde(default)]
    pub message: String,
}

/// Kind of a webhook change, inferred from the value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    /// The value carries status updates for previously sent messages
    StatusUpdate,
    /// The value carries inbound messages
    IncomingMessage,
    /// Anything else (template quality updates, account alerts, ...)
    SystemNotification,
}

/// Classify a webhook change by the shape of its value.
///
/// Contract (checked in this order, first match wins):
/// 1. non-empty `statuses` array → [`WebhookKind::StatusUpdate`]
/// 2. non-empty `messages` array → [`WebhookKind::IncomingMessage`]
/// 3. anything else → [`WebhookKind::SystemNotification`]
///
/// Meta does not send a discriminator field, so this shape matching is the
/// dispatch contract for the webhook processor. Verified against Graph API
/// v18.0 payloads.
#[must_use]
pub fn classify_change(change: &WebhookChange) -> WebhookKind {
    if !change.value.statuses.is_empty() {
        WebhookKind::StatusUpdate
    } else if !change.value.messages.is_empty() {
        WebhookKind::IncomingMessage
    } else {
        WebhookKind::SystemNotification
    }
}

impl WebhookMessage {
    /// Message kind of this inbound message.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_api_type(&self.message_type)
    }

    /// Human-readable content extract: the text body for text messages, a
    /// `[kind]` placeholder otherwise.
    #[must_use]
    pub fn content_extract(&self) -> String {
        match &self.text {
            Some(text) if !text.body.is_empty() => text.body.clone(),
            _ => format!("[{}]", self.kind()),
        }
    }
}

/// Compare the verify-token query parameter against the configured secret.
///
/// Meta sends `hub.mode=subscribe` during webhook setup; the challenge is
/// echoed back verbatim on a match and nothing else happens for that call.
#[must_use]
pub fn verify_subscription<'a>(
    mode: &str,
    token: &str,
    challenge: &'a str,
    expected_token: &str,
) -> Option<&'a str> {
    if mode == "subscribe" && token == expected_token {
        Some(challenge)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> WebhookNotification {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_classify_incoming_message() {
        let notification = parse(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "waba1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "contacts": [{"profile": {"name": "Ana"}, "wa_id": "34600000001"}],
                        "messages": [{
                            "from": "34600000001",
                            "id": "wamid.IN1",
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": {"body": "hola"}
                        }]
                    }
                }]
            }]
        }));
        let change = &notification.entry[0].changes[0];
        assert_eq!(classify_change(change), WebhookKind::IncomingMessage);
        assert_eq!(change.value.messages[0].content_extract(), "hola");
        assert_eq!(change.value.messages[0].kind(), MessageKind::Text);
    }

    #[test]
    fn test_classify_status_update() {
        let notification = parse(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "statuses": [{
                            "id": "wamid.OUT1",
                            "status": "delivered",
                            "timestamp": "1700000001",
                            "recipient_id": "34600000001"
                        }]
                    }
                }]
            }]
        }));
        assert_eq!(
            classify_change(&notification.entry[0].changes[0]),
            WebhookKind::StatusUpdate
        );
    }

    #[test]
    fn test_statuses_win_over_messages() {
        // A malformed value carrying both arrays still resolves
        // deterministically: statuses take precedence.
        let notification = parse(json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{"from": "1", "id": "wamid.A", "type": "text"}],
                        "statuses": [{"id": "wamid.B", "status": "read"}]
                    }
                }]
            }]
        }));
        assert_eq!(
            classify_change(&notification.entry[0].changes[0]),
            WebhookKind::StatusUpdate
        );
    }

    #[test]
    fn test_classify_system_notification() {
        let notification = parse(json!({
            "entry": [{
                "changes": [{
                    "field": "message_template_quality_update",
                    "value": {"messaging_product": "whatsapp"}
                }]
            }]
        }));
        assert_eq!(
            classify_change(&notification.entry[0].changes[0]),
            WebhookKind::SystemNotification
        );
    }

    #[test]
    fn test_non_text_content_extract() {
        let message: WebhookMessage = serde_json::from_value(json!({
            "from": "34600000001",
            "id": "wamid.IMG",
            "type": "image",
            "image": {"id": "media9", "mime_type": "image/jpeg"}
        }))
        .unwrap();
        assert_eq!(message.kind(), MessageKind::Image);
        assert_eq!(message.content_extract(), "[image]");
        // opaque media object retained for persistence
        assert_eq!(message.rest["image"]["id"], "media9");
    }

    #[test]
    fn test_verify_subscription() {
        assert_eq!(
            verify_subscription("subscribe", "secret", "challenge123", "secret"),
            Some("challenge123")
        );
        assert_eq!(
            verify_subscription("subscribe", "wrong", "challenge123", "secret"),
            None
        );
        assert_eq!(
            verify_subscription("unsubscribe", "secret", "challenge123", "secret"),
            None
        );
    }

    #[test]
    fn test_failed_status_carries_errors() {
        let status: WebhookStatus = serde_json::from_value(json!({
            "id": "wamid.OUT2",
            "status": "failed",
            "errors": [{"code": 131026, "title": "Message undeliverable"}]
        }))
        .unwrap();
        assert_eq!(status.errors[0].code, 131_026);
    }
}
