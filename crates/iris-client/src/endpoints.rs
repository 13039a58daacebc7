//! Endpoint template resolution
//!
//! Logical operations map to URL path templates with `{name}` placeholders.
//! Rendering substitutes placeholders by key; a placeholder left unresolved
//! is a caller programming error and fails fast — the request is never
//! built, let alone sent with a literal `{...}` in the path.

use iris_core::{Error, Result};

/// Logical Cloud API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Send a message / mark as read
    Messages,
    /// Open a resumable media upload session
    MediaUploadInit,
    /// Upload chunks to / query an upload session
    MediaUploadSession,
    /// Fetch a media object's download URL
    Media,
    /// Per-template analytics time series
    TemplateAnalytics,
}

impl Endpoint {
    /// Path template for this operation (relative to `{base_url}/{version}/`).
    #[must_use]
    pub fn template(&self) -> &'static str {
        match self {
            Self::Messages => "{phone_number_id}/messages",
            Self::MediaUploadInit => "app/uploads",
            Self::MediaUploadSession => "{session_id}",
            Self::Media => "{media_id}",
            Self::TemplateAnalytics => "{phone_number_id}/template_analytics",
        }
    }

    /// Render the template, substituting `{name}` placeholders by key.
    pub fn render(&self, params: &[(&str, &str)]) -> Result<String> {
        let mut path = self.template().to_string();
        for (key, value) in params {
            path = path.replace(&format!("{{{key}}}"), value);
        }
        if let (Some(open), Some(close)) = (path.find('{'), path.find('}')) {
            if open < close {
                return Err(Error::Endpoint(path[open..=close].to_string()));
            }
        }
        Ok(path)
    }
}
