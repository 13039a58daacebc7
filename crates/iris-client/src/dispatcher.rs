//! Dispatch core - validate, send, persist
//!
//! `send_message` writes exactly one outbound record per call, whatever
//! happens on the wire. A transport failure is swallowed into a FAILED
//! record instead of being propagated: message dispatch is a persisted
//! event whether or not the provider accepted it, so automation built on
//! top can inspect the outcome without branching on exceptions. This is a
//! deliberate business rule — do not "fix" it into a thrown error.

use crate::endpoints::Endpoint;
use crate::transport::{HttpMethod, Transport};
use iris_core::payload::{self, MediaRef, ReplyButton};
use iris_core::{Error, GatewayConfig, MessageKind, MessageRepository, OutboundRecord, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Envelope keys every outbound payload must carry.
const REQUIRED_ENVELOPE_KEYS: [&str; 3] = ["messaging_product", "to", "type"];

/// The outbound dispatch core.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    repository: Arc<dyn MessageRepository>,
    config: GatewayConfig,
}

impl Dispatcher {
    /// Create a dispatcher over a transport and a message repository.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        repository: Arc<dyn MessageRepository>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            transport,
            repository,
            config,
        }
    }

    /// Dispatch a built payload through the given phone number id.
    ///
    /// Returns the persisted record: status `Sent` with the provider id on
    /// acceptance, status `Failed` with error details captured on any
    /// transport or provider failure. Only structural validation failures
    /// (missing envelope keys — a caller bug) and persistence failures
    /// propagate as errors.
    #[instrument(skip(self, payload), fields(phone_number_id))]
    pub async fn send_message(
        &self,
        payload: Value,
        phone_number_id: &str,
    ) -> Result<OutboundRecord> {
        validate_envelope(&payload)?;

        let to = payload["to"].as_str().unwrap_or_default().to_string();
        let kind = MessageKind::from_api_type(payload["type"].as_str().unwrap_or_default());
        let content = extract_content(&payload, kind);
        let context_wa_id = payload["context"]["message_id"]
            .as_str()
            .map(ToString::to_string);

        let path = Endpoint::Messages.render(&[("phone_number_id", phone_number_id)])?;

        let record = match self
            .transport
            .request_json(HttpMethod::Post, &path, &[], Some(payload.clone()))
            .await
            .and_then(|response| provider_message_id(&response))
        {
            Ok(wa_id) => {
                info!(%wa_id, to = %to, kind = %kind, "message accepted by provider");
                OutboundRecord::sent(wa_id, to, kind, content, payload)
            }
            Err(e) => {
                warn!(to = %to, kind = %kind, error = %e, "message dispatch failed");
                OutboundRecord::failed(to, kind, content, payload, e.to_string(), e.api_code())
            }
        };

        let record = match context_wa_id {
            Some(wa_id) => record.with_context(wa_id),
            None => record,
        };

        self.repository.create_outbound(&record).await?;
        Ok(record)
    }

    /// Build and send a text message.
    pub async fn send_text(
        &self,
        to: &str,
        body: &str,
        reply_to: Option<&str>,
    ) -> Result<OutboundRecord> {
        let payload = payload::text(to, body, false, reply_to)?;
        self.send_message(payload, &self.config.phone_number_id)
            .await
    }

    /// Build and send an image message.
    pub async fn send_image(
        &self,
        to: &str,
        media: &MediaRef,
        caption: Option<&str>,
    ) -> Result<OutboundRecord> {
        let payload = payload::image(to, media, caption, None)?;
        self.send_message(payload, &self.config.phone_number_id)
            .await
    }

    /// Build and send a document message.
    pub async fn send_document(
        &self,
        to: &str,
        media: &MediaRef,
        caption: Option<&str>,
        filename: Option<&str>,
    ) -> Result<OutboundRecord> {
        let payload = payload::document(to, media, caption, filename, None)?;
        self.send_message(payload, &self.config.phone_number_id)
            .await
    }

    /// Build and send a template message.
    pub async fn send_template(
        &self,
        to: &str,
        name: &str,
        language_code: &str,
        components: Option<Value>,
    ) -> Result<OutboundRecord> {
        let payload = payload::template(to, name, language_code, components)?;
        self.send_message(payload, &self.config.phone_number_id)
            .await
    }

    /// Build and send a location message.
    pub async fn send_location(
        &self,
        to: &str,
        latitude: f64,
        longitude: f64,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<OutboundRecord> {
        let payload = payload::location(to, latitude, longitude, name, address, None)?;
        self.send_message(payload, &self.config.phone_number_id)
            .await
    }

    /// Build and send an interactive reply-button message.
    pub async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<OutboundRecord> {
        let payload = payload::interactive_buttons(to, body, buttons, None)?;
        self.send_message(payload, &self.config.phone_number_id)
            .await
    }

    /// Mark an inbound message as read on the provider side.
    ///
    /// This is a provider-state call, not a dispatch: nothing is persisted
    /// and errors propagate.
    pub async fn mark_as_read(&self, message_id: &str) -> Result<()> {
        let path =
            Endpoint::Messages.render(&[("phone_number_id", &self.config.phone_number_id)])?;
        let body = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        });
        self.transport
            .request_json(HttpMethod::Post, &path, &[], Some(body))
            .await?;
        debug!(%message_id, "marked as read");
        Ok(())
    }
}

/// Structural envelope check: required keys present and non-empty.
/// Fails fast — no network call is attempted for a malformed payload.
fn validate_envelope(payload: &Value) -> Result<()> {
    let Some(object) = payload.as_object() else {
        return Err(Error::invalid_message(
            "payload is not a JSON object",
            json!({ "required": REQUIRED_ENVELOPE_KEYS }),
        ));
    };
    for key in REQUIRED_ENVELOPE_KEYS {
        let present = object
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|v| !v.is_empty());
        if !present {
            return Err(Error::invalid_message(
                format!("payload is missing required envelope key '{key}'"),
                json!({ "missing": key, "required": REQUIRED_ENVELOPE_KEYS }),
            ));
        }
    }
    Ok(())
}

/// Pull the provider message id out of a send response.
fn provider_message_id(response: &Value) -> Result<String> {
    response["messages"][0]["id"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| Error::InvalidApiResponse("response is missing messages[0].id".into()))
}

/// Human-readable content extract for the persisted record.
fn extract_content(payload: &Value, kind: MessageKind) -> String {
    match kind {
        MessageKind::Text => payload["text"]["body"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        MessageKind::Image | MessageKind::Video | MessageKind::Document => {
            match payload[kind.as_str()]["caption"].as_str() {
                Some(caption) => caption.to_string(),
                None => format!("[{kind}]"),
            }
        }
        MessageKind::Template => {
            let name = payload["template"]["name"].as_str().unwrap_or_default();
            format!("[template: {name}]")
        }
        MessageKind::Location => match payload["location"]["name"].as_str() {
            Some(name) => format!("[location: {name}]"),
            None => "[location]".to_string(),
        },
        MessageKind::Interactive => payload["interactive"]["body"]["text"]
            .as_str()
            .unwrap_or("[interactive]")
            .to_string(),
        MessageKind::Reaction => {
            let emoji = payload["reaction"]["emoji"].as_str().unwrap_or_default();
            format!("[reaction: {emoji}]")
        }
        _ => format!("[{kind}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use iris_core::MessageStatus;
    use iris_store::SqliteStore;

    fn test_config() -> GatewayConfig {
        GatewayConfig::new("token", "123456")
    }

    async fn dispatcher_with(transport: MockTransport) -> (Dispatcher, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let dispatcher = Dispatcher::new(Arc::new(transport), store.clone(), test_config());
        (dispatcher, store)
    }

    #[tokio::test]
    async fn test_successful_send_persists_sent_record() {
        let mut transport = MockTransport::new();
        transport
            .expect_request_json()
            .withf(|method, path, _, body| {
                *method == HttpMethod::Post
                    && path == "123456/messages"
                    && body.as_ref().is_some_and(|b| b["type"] == "text")
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(json!({
                    "messaging_product": "whatsapp",
                    "contacts": [{"input": "+123456789", "wa_id": "123456789"}],
                    "messages": [{"id": "wamid.XXX"}]
                }))
            });

        let (dispatcher, store) = dispatcher_with(transport).await;
        let record = dispatcher
            .send_text("+123456789", "Hola Mundo", None)
            .await
            .unwrap();

        assert_eq!(record.status, MessageStatus::Sent);
        assert_eq!(record.wa_id.as_deref(), Some("wamid.XXX"));
        assert_eq!(record.message_content, "Hola Mundo");
        assert!(record.sent_at.is_some());

        // Exactly one persisted record, findable by provider id.
        let stored = store
            .find_outbound_by_provider_id("wamid.XXX")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(stored.message_content, "Hola Mundo");
        assert_eq!(stored.to, "+123456789");
    }

    #[tokio::test]
    async fn test_transport_failure_persists_failed_record_without_throwing() {
        let mut transport = MockTransport::new();
        transport
            .expect_request_json()
            .times(1)
            .returning(|_, _, _, _| Err(Error::Network("connection reset by peer".into())));

        let (dispatcher, _store) = dispatcher_with(transport).await;
        let record = dispatcher
            .send_text("+123456789", "hello", None)
            .await
            .unwrap();

        assert_eq!(record.status, MessageStatus::Failed);
        assert!(record.wa_id.is_none());
        assert_eq!(
            record.error_details.as_deref(),
            Some("network error: connection reset by peer")
        );
        assert!(record.failed_at.is_some());
    }

    #[tokio::test]
    async fn test_api_rejection_captures_error_code() {
        let mut transport = MockTransport::new();
        transport.expect_request_json().times(1).returning(|_, _, _, _| {
            Err(Error::Api {
                status: 400,
                code: 131_026,
                message: "Message undeliverable".into(),
                details: Value::Null,
            })
        });

        let (dispatcher, _store) = dispatcher_with(transport).await;
        let record = dispatcher
            .send_text("+123456789", "hello", None)
            .await
            .unwrap();

        assert_eq!(record.status, MessageStatus::Failed);
        assert_eq!(record.error_code, Some(131_026));
    }

    #[tokio::test]
    async fn test_oversized_text_makes_zero_transport_calls() {
        let mut transport = MockTransport::new();
        transport.expect_request_json().times(0);

        let (dispatcher, _store) = dispatcher_with(transport).await;
        let body = "x".repeat(5000);
        let err = dispatcher
            .send_text("+123456789", &body, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMessage { .. }));
    }

    #[tokio::test]
    async fn test_bad_recipient_makes_zero_transport_calls() {
        let mut transport = MockTransport::new();
        transport.expect_request_json().times(0);

        let (dispatcher, _store) = dispatcher_with(transport).await;
        let err = dispatcher
            .send_text("0123", "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMessage { .. }));
    }

    #[tokio::test]
    async fn test_missing_envelope_key_fails_before_network() {
        let mut transport = MockTransport::new();
        transport.expect_request_json().times(0);

        let (dispatcher, _store) = dispatcher_with(transport).await;
        let payload = json!({ "to": "+123456789", "type": "text" });
        let err = dispatcher
            .send_message(payload, "123456")
            .await
            .unwrap_err();
        match err {
            Error::InvalidMessage { message, .. } => {
                assert!(message.contains("messaging_product"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_response_without_message_id_is_a_failed_record() {
        let mut transport = MockTransport::new();
        transport
            .expect_request_json()
            .times(1)
            .returning(|_, _, _, _| Ok(json!({ "messaging_product": "whatsapp" })));

        let (dispatcher, _store) = dispatcher_with(transport).await;
        let record = dispatcher
            .send_text("+123456789", "hello", None)
            .await
            .unwrap();
        assert_eq!(record.status, MessageStatus::Failed);
        assert!(record
            .error_details
            .as_deref()
            .unwrap()
            .contains("messages[0].id"));
    }

    #[tokio::test]
    async fn test_reply_context_is_recorded() {
        let mut transport = MockTransport::new();
        transport
            .expect_request_json()
            .times(1)
            .returning(|_, _, _, _| Ok(json!({ "messages": [{"id": "wamid.R1"}] })));

        let (dispatcher, _store) = dispatcher_with(transport).await;
        let record = dispatcher
            .send_text("+123456789", "reply", Some("wamid.PREV"))
            .await
            .unwrap();
        assert_eq!(record.context_wa_id.as_deref(), Some("wamid.PREV"));
    }

    #[tokio::test]
    async fn test_mark_as_read() {
        let mut transport = MockTransport::new();
        transport
            .expect_request_json()
            .withf(|method, path, _, body| {
                *method == HttpMethod::Post
                    && path == "123456/messages"
                    && body.as_ref().is_some_and(|b| {
                        b["status"] == "read" && b["message_id"] == "wamid.IN"
                    })
            })
            .times(1)
            .returning(|_, _, _, _| Ok(json!({ "success": true })));

        let (dispatcher, _store) = dispatcher_with(transport).await;
        dispatcher.mark_as_read("wamid.IN").await.unwrap();
    }

    #[test]
    fn test_extract_content_variants() {
        let text = json!({ "type": "text", "text": { "body": "hi" } });
        assert_eq!(extract_content(&text, MessageKind::Text), "hi");

        let image = json!({ "type": "image", "image": { "id": "m1", "caption": "sunset" } });
        assert_eq!(extract_content(&image, MessageKind::Image), "sunset");

        let image_plain = json!({ "type": "image", "image": { "id": "m1" } });
        assert_eq!(extract_content(&image_plain, MessageKind::Image), "[image]");

        let template = json!({ "type": "template", "template": { "name": "order_update" } });
        assert_eq!(
            extract_content(&template, MessageKind::Template),
            "[template: order_update]"
        );
    }
}
