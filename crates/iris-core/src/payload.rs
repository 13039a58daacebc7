//! Payload builders - typed inputs to Cloud API wire format
//!
//! Each builder is a pure function: it validates its inputs and constructs
//! the exact JSON body the `/messages` endpoint expects. Validation failures
//! are [`Error::InvalidMessage`] raised before any network I/O — an invalid
//! payload is never sent over the wire.
//!
//! Every payload carries the fixed envelope fields
//! (`messaging_product = "whatsapp"`, `recipient_type = "individual"`, `to`,
//! `type`) plus a type-specific sub-object, plus `context.message_id` when
//! replying to an earlier message.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::LazyLock;

/// WhatsApp text message body limit (characters)
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Media caption limit (characters)
pub const MAX_CAPTION_LENGTH: usize = 1024;

/// E.164-like recipient pattern: optional `+`, 2-15 digits, no leading zero.
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid phone regex"));

/// Reference to an uploaded or hosted media asset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaRef {
    /// Provider media handle from an upload session
    Id(String),
    /// Publicly reachable HTTPS URL
    Link(String),
}

/// A reply button for interactive messages.
#[derive(Debug, Clone)]
pub struct ReplyButton {
    /// Developer-chosen id echoed back in the button reply
    pub id: String,
    /// Button label shown to the user (max 20 chars per provider docs)
    pub title: String,
}

#[derive(Serialize)]
struct Context<'a> {
    message_id: &'a str,
}

#[derive(Serialize)]
struct Envelope<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Context<'a>>,
    #[serde(flatten)]
    body: Value,
}

fn envelope(to: &str, kind: &'static str, reply_to: Option<&str>, body: Value) -> Result<Value> {
    validate_recipient(to)?;
    let envelope = Envelope {
        messaging_product: "whatsapp",
        recipient_type: "individual",
        to,
        kind,
        context: reply_to.map(|message_id| Context { message_id }),
        body,
    };
    serde_json::to_value(envelope)
        .map_err(|e| Error::InvalidApiResponse(format!("payload serialization: {e}")))
}

/// Validate a recipient phone number against the E.164-like pattern.
pub fn validate_recipient(to: &str) -> Result<()> {
    if PHONE_PATTERN.is_match(to) {
        return Ok(());
    }
    Err(Error::invalid_message(
        format!("recipient '{to}' is not a valid phone number"),
        json!({ "field": "to", "value": to, "pattern": PHONE_PATTERN.as_str() }),
    ))
}

fn validate_caption(caption: Option<&str>) -> Result<()> {
    if let Some(caption) = caption {
        let len = caption.chars().count();
        if len > MAX_CAPTION_LENGTH {
            return Err(Error::invalid_message(
                format!("caption exceeds {MAX_CAPTION_LENGTH} characters"),
                json!({ "field": "caption", "length": len, "limit": MAX_CAPTION_LENGTH }),
            ));
        }
    }
    Ok(())
}

fn media_body(kind: &str, media: &MediaRef, extra: Value) -> Value {
    let mut object = match media {
        MediaRef::Id(id) => json!({ "id": id }),
        MediaRef::Link(link) => json!({ "link": link }),
    };
    if let (Some(object), Some(extra)) = (object.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            object.insert(key.clone(), value.clone());
        }
    }
    json!({ kind: object })
}

/// Build a text message payload.
pub fn text(to: &str, body: &str, preview_url: bool, reply_to: Option<&str>) -> Result<Value> {
    let len = body.chars().count();
    if len > MAX_TEXT_LENGTH {
        return Err(Error::invalid_message(
            format!("text body exceeds {MAX_TEXT_LENGTH} characters"),
            json!({ "field": "body", "length": len, "limit": MAX_TEXT_LENGTH }),
        ));
    }
    if body.is_empty() {
        return Err(Error::invalid_message(
            "text body is empty",
            json!({ "field": "body" }),
        ));
    }
    envelope(
        to,
        "text",
        reply_to,
        json!({ "text": { "body": body, "preview_url": preview_url } }),
    )
}

/// Build an image message payload.
pub fn image(
    to: &str,
    media: &MediaRef,
    caption: Option<&str>,
    reply_to: Option<&str>,
) -> Result<Value> {
    validate_caption(caption)?;
    let extra = caption.map_or(json!({}), |c| json!({ "caption": c }));
    envelope(to, "image", reply_to, media_body("image", media, extra))
}

/// Build a document message payload.
pub fn document(
    to: &str,
    media: &MediaRef,
    caption: Option<&str>,
    filename: Option<&str>,
    reply_to: Option<&str>,
) -> Result<Value> {
    validate_caption(caption)?;
    let mut extra = serde_json::Map::new();
    if let Some(caption) = caption {
        extra.insert("caption".into(), json!(caption));
    }
    if let Some(filename) = filename {
        extra.insert("filename".into(), json!(filename));
    }
    envelope(
        to,
        "document",
        reply_to,
        media_body("document", media, Value::Object(extra)),
    )
}

/// Build an audio message payload.
pub fn audio(to: &str, media: &MediaRef, reply_to: Option<&str>) -> Result<Value> {
    envelope(to, "audio", reply_to, media_body("audio", media, json!({})))
}

/// Build a video message payload.
pub fn video(
    to: &str,
    media: &MediaRef,
    caption: Option<&str>,
    reply_to: Option<&str>,
) -> Result<Value> {
    validate_caption(caption)?;
    let extra = caption.map_or(json!({}), |c| json!({ "caption": c }));
    envelope(to, "video", reply_to, media_body("video", media, extra))
}

/// Build a sticker message payload.
pub fn sticker(to: &str, media: &MediaRef, reply_to: Option<&str>) -> Result<Value> {
    envelope(
        to,
        "sticker",
        reply_to,
        media_body("sticker", media, json!({})),
    )
}

/// Build a template message payload.
///
/// `components` is passed through opaquely — template parameter shapes are
/// defined by the approved template itself, not by the gateway.
pub fn template(
    to: &str,
    name: &str,
    language_code: &str,
    components: Option<Value>,
) -> Result<Value> {
    if name.is_empty() {
        return Err(Error::invalid_message(
            "template name is empty",
            json!({ "field": "name" }),
        ));
    }
    let mut body = json!({
        "template": {
            "name": name,
            "language": { "code": language_code },
        }
    });
    if let Some(components) = components {
        body["template"]["components"] = components;
    }
    envelope(to, "template", None, body)
}

/// Build a location message payload.
pub fn location(
    to: &str,
    latitude: f64,
    longitude: f64,
    name: Option<&str>,
    address: Option<&str>,
    reply_to: Option<&str>,
) -> Result<Value> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::invalid_message(
            format!("coordinates out of range: ({latitude}, {longitude})"),
            json!({ "field": "location", "latitude": latitude, "longitude": longitude }),
        ));
    }
    let mut location = json!({ "latitude": latitude, "longitude": longitude });
    if let Some(name) = name {
        location["name"] = json!(name);
    }
    if let Some(address) = address {
        location["address"] = json!(address);
    }
    envelope(to, "location", reply_to, json!({ "location": location }))
}

/// Build an interactive reply-button message payload (1-3 buttons).
pub fn interactive_buttons(
    to: &str,
    body: &str,
    buttons: &[ReplyButton],
    reply_to: Option<&str>,
) -> Result<Value> {
    if buttons.is_empty() || buttons.len() > 3 {
        return Err(Error::invalid_message(
            format!("interactive messages take 1-3 buttons, got {}", buttons.len()),
            json!({ "field": "buttons", "count": buttons.len() }),
        ));
    }
    let len = body.chars().count();
    if len > MAX_CAPTION_LENGTH {
        return Err(Error::invalid_message(
            format!("interactive body exceeds {MAX_CAPTION_LENGTH} characters"),
            json!({ "field": "body", "length": len, "limit": MAX_CAPTION_LENGTH }),
        ));
    }
    let buttons: Vec<Value> = buttons
        .iter()
        .map(|b| json!({ "type": "reply", "reply": { "id": b.id, "title": b.title } }))
        .collect();
    envelope(
        to,
        "interactive",
        reply_to,
        json!({
            "interactive": {
                "type": "button",
                "body": { "text": body },
                "action": { "buttons": buttons },
            }
        }),
    )
}

/// Build a reaction payload (emoji applied to an existing message).
///
/// An empty emoji string removes a previous reaction, per the provider API.
pub fn reaction(to: &str, message_id: &str, emoji: &str) -> Result<Value> {
    if message_id.is_empty() {
        return Err(Error::invalid_message(
            "reaction requires a target message id",
            json!({ "field": "message_id" }),
        ));
    }
    envelope(
        to,
        "reaction",
        None,
        json!({ "reaction": { "message_id": message_id, "emoji": emoji } }),
    )
}
