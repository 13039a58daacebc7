//! Error types for the Iris gateway

use thiserror::Error;

/// Gateway error type
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-side message contract violation. Raised before any network
    /// call is attempted — an invalid payload is never sent over the wire.
    #[error("invalid message: {message}")]
    InvalidMessage {
        /// What was violated
        message: String,
        /// Structured context for diagnostics (field, limit, actual value)
        context: serde_json::Value,
    },

    /// Caller-side media contract violation (missing file, disallowed MIME
    /// type, size over the per-type cap). Raised before any network call.
    #[error("invalid media: {message}")]
    InvalidMedia {
        /// What was violated
        message: String,
        /// Structured context (allowed set, limit, actual)
        context: serde_json::Value,
    },

    /// Provider-side failure: a non-2xx response from the Cloud API.
    #[error("api error {code} (http {status}): {message}")]
    Api {
        /// HTTP status of the response
        status: u16,
        /// Provider error code from the response body
        code: i64,
        /// Provider error message
        message: String,
        /// Raw error body for diagnostics
        details: serde_json::Value,
    },

    /// Upload-session protocol violation (no session id, no media handle).
    #[error("media upload error: {0}")]
    MediaUpload(String),

    /// Provider response failed structural validation.
    #[error("invalid api response: {0}")]
    InvalidApiResponse(String),

    /// Transport-layer failure (connect, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// Endpoint template rendered with a missing placeholder value.
    /// This is a caller programming error and fails fast — the request
    /// is never built, let alone sent.
    #[error("unresolved endpoint placeholder: {0}")]
    Endpoint(String),

    /// Persistence-layer failure.
    #[error("store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },
}

impl Error {
    /// Build an `InvalidMessage` error with a context object.
    pub fn invalid_message(message: impl Into<String>, context: serde_json::Value) -> Self {
        Self::InvalidMessage {
            message: message.into(),
            context,
        }
    }

    /// Build an `InvalidMedia` error with a context object.
    pub fn invalid_media(message: impl Into<String>, context: serde_json::Value) -> Self {
        Self::InvalidMedia {
            message: message.into(),
            context,
        }
    }

    /// Provider error code, when this is an API error.
    #[must_use]
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_message_display() {
        let err = Error::invalid_message("body too long", serde_json::json!({"limit": 4096}));
        assert_eq!(err.to_string(), "invalid message: body too long");
    }

    #[test]
    fn test_api_code_accessor() {
        let err = Error::Api {
            status: 400,
            code: 131_026,
            message: "Message undeliverable".into(),
            details: serde_json::Value::Null,
        };
        assert_eq!(err.api_code(), Some(131_026));
        assert!(Error::Network("timeout".into()).api_code().is_none());
    }
}
