//! Transport - the HTTP layer under every Cloud API call
//!
//! The [`Transport`] trait is the seam the dispatch core, media pipeline,
//! and analytics job talk through; [`HttpTransport`] is the reqwest
//! implementation. Non-2xx responses become [`Error::Api`] with the
//! provider's error body parsed out; transport-level failures become
//! [`Error::Network`]. Retries are governed by the injected
//! [`RetryPolicy`](iris_core::RetryPolicy) and default to a single attempt.

use iris_core::{Error, GatewayConfig, Result};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP verb for a Cloud API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// DELETE
    Delete,
}

/// The HTTP seam every provider call goes through.
///
/// `path` arguments are rendered endpoint paths relative to the versioned
/// base URL (see [`Endpoint::render`](crate::Endpoint::render)).
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Execute a JSON request and return the parsed response body.
    async fn request_json(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value>;

    /// Upload one binary chunk to an upload session, carrying the byte
    /// offset header the resumable-upload protocol requires.
    async fn upload_chunk(&self, path: &str, offset: u64, bytes: Vec<u8>) -> Result<Value>;
}

/// reqwest-backed transport with versioned URL building and bearer auth.
pub struct HttpTransport {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HttpTransport {
    /// Build a transport from gateway configuration.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| Error::Network(format!("http client init: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url, self.config.api_version, path
        )
    }

    async fn execute_once(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.url(path);
        let mut request = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Delete => self.client.delete(&url),
        }
        .bearer_auth(self.config.access_token.expose_secret());

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        read_json_response(response).await
    }

    /// Whether a failed attempt is worth retrying (429, 5xx, network).
    fn is_retryable(error: &Error) -> bool {
        match error {
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            Error::Network(_) => true,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn request_json(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value> {
        let attempts = self.config.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.retry.backoff_delay_secs(attempt - 1);
                warn!(path, attempt, delay_secs = delay, "retrying api request");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            match self.execute_once(method, path, query, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) if Self::is_retryable(&e) && attempt + 1 < attempts => {
                    debug!(path, error = %e, "retryable api failure");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Network("no attempts executed".into())))
    }

    async fn upload_chunk(&self, path: &str, offset: u64, bytes: Vec<u8>) -> Result<Value> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.config.access_token.expose_secret())
            .header("file_offset", offset.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        read_json_response(response).await
    }
}

/// Map a reqwest response to JSON, turning non-2xx into [`Error::Api`]
/// with the provider error body parsed out.
async fn read_json_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    if status.is_success() {
        return serde_json::from_str(&text)
            .map_err(|e| Error::InvalidApiResponse(format!("malformed response body: {e}")));
    }

    let details: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    Err(parse_api_error(status.as_u16(), details))
}

/// Build an [`Error::Api`] from a status and the provider error body
/// (`{"error": {"message": ..., "code": ...}}`).
fn parse_api_error(status: u16, details: Value) -> Error {
    let error = &details["error"];
    let message = error["message"]
        .as_str()
        .unwrap_or("unknown provider error")
        .to_string();
    let code = error["code"].as_i64().unwrap_or(0);
    Error::Api {
        status,
        code,
        message,
        details,
    }
}
