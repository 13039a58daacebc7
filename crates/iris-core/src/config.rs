//! Gateway configuration
//!
//! One explicit config struct, built once at startup and injected into every
//! component that needs it (transport, dispatcher, webhook state, analytics
//! job). Nothing in this workspace reads configuration from globals.

use crate::error::{Error, Result};
use secrecy::SecretString;

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

/// Retry policy for the HTTP transport.
///
/// The provider documents no retry expectations, so the default is a single
/// attempt (no retry) — the historical behavior. Operators who want retries
/// on 429/5xx opt in explicitly.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retry).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts, in seconds.
    pub backoff_base_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_base_secs: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry attempt `attempt` (0-based), capped at 60s.
    #[must_use]
    pub fn backoff_delay_secs(&self, attempt: u32) -> u64 {
        let delay = self
            .backoff_base_secs
            .saturating_mul(2u64.saturating_pow(attempt));
        delay.min(60)
    }
}

/// WhatsApp Cloud API gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Graph API base URL (no trailing slash)
    pub base_url: String,
    /// Graph API version segment (e.g. `v18.0`)
    pub api_version: String,
    /// Access token from Meta Business Suite
    pub access_token: SecretString,
    /// Phone Number ID the gateway sends from; also scopes the template
    /// analytics queries
    pub phone_number_id: String,
    /// Webhook verify token compared against `hub.verify_token`
    pub webhook_verify_token: String,
    /// HTTP client timeout in seconds
    pub http_timeout_secs: u64,
    /// Default ISO 4217 currency code for analytics cost records
    pub default_currency: String,
    /// Transport retry policy
    pub retry: RetryPolicy,
}

impl GatewayConfig {
    /// Create with required fields and defaults for the rest.
    #[must_use]
    pub fn new(access_token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            access_token: access_token.into().into(),
            phone_number_id: phone_number_id.into(),
            webhook_verify_token: "iris_webhook_verify".to_string(),
            http_timeout_secs: 30,
            default_currency: "USD".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("WHATSAPP_ACCESS_TOKEN").map_err(|_| {
            Error::InvalidConfig {
                field: "WHATSAPP_ACCESS_TOKEN".into(),
                message: "not set".into(),
            }
        })?;

        let phone_number_id = std::env::var("WHATSAPP_PHONE_NUMBER_ID").map_err(|_| {
            Error::InvalidConfig {
                field: "WHATSAPP_PHONE_NUMBER_ID".into(),
                message: "not set".into(),
            }
        })?;

        let mut config = Self::new(access_token, phone_number_id);

        if let Ok(url) = std::env::var("WHATSAPP_API_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(version) = std::env::var("WHATSAPP_API_VERSION") {
            config.api_version = version;
        }
        if let Ok(token) = std::env::var("WHATSAPP_WEBHOOK_VERIFY_TOKEN") {
            config.webhook_verify_token = token;
        }
        if let Ok(timeout) = std::env::var("WHATSAPP_HTTP_TIMEOUT_SECS") {
            config.http_timeout_secs =
                timeout.parse().map_err(|_| Error::InvalidConfig {
                    field: "WHATSAPP_HTTP_TIMEOUT_SECS".into(),
                    message: format!("not a number: {timeout}"),
                })?;
        }
        if let Ok(currency) = std::env::var("WHATSAPP_DEFAULT_CURRENCY") {
            config.default_currency = currency;
        }
        if let Ok(attempts) = std::env::var("WHATSAPP_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts =
                attempts.parse().map_err(|_| Error::InvalidConfig {
                    field: "WHATSAPP_RETRY_MAX_ATTEMPTS".into(),
                    message: format!("not a number: {attempts}"),
                })?;
        }

        Ok(config)
    }

    /// Set the base URL (trailing slash stripped).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the API version segment.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set the webhook verify token.
    #[must_use]
    pub fn with_webhook_verify_token(mut self, token: impl Into<String>) -> Self {
        self.webhook_verify_token = token.into();
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new("token", "phone_id");
        assert_eq!(config.base_url, "https://graph.facebook.com");
        assert_eq!(config.phone_number_id, "phone_id");
        assert_eq!(config.api_version, "v18.0");
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.default_currency, "USD");
    }

    #[test]
    fn test_builders() {
        let config = GatewayConfig::new("token", "phone_id")
            .with_base_url("http://localhost:9000/")
            .with_api_version("v20.0")
            .with_webhook_verify_token("secret");

        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.api_version, "v20.0");
        assert_eq!(config.webhook_verify_token, "secret");
    }

    #[test]
    fn test_backoff_delay_caps_at_sixty() {
        let retry = RetryPolicy {
            max_attempts: 10,
            backoff_base_secs: 2,
        };
        assert_eq!(retry.backoff_delay_secs(0), 2);
        assert_eq!(retry.backoff_delay_secs(1), 4);
        assert_eq!(retry.backoff_delay_secs(2), 8);
        assert_eq!(retry.backoff_delay_secs(30), 60);
    }
}
