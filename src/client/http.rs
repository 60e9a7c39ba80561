// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP client for the job API.
//!
//! This module provides a low-level HTTP client with:
//! - Connection pooling
//! - Automatic retry with exponential backoff
//! - `TD1` API key authentication
//! - Configurable timeouts
//!
//! The client never decompresses bodies itself. Result responses are handed
//! to the result pipeline with their `Content-Encoding` intact.

use crate::error::{Error, Result};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for the HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpClientConfig {
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Longest wait for the next read of a response. Applies between body
    /// chunks, so a result download may run for any length of time while
    /// data keeps arriving.
    pub read_timeout: Duration,
    /// Deadline for a whole control-plane exchange, body included. Never
    /// applied to result downloads.
    pub request_timeout: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retry attempts (doubles each retry).
    pub retry_delay: Duration,
    /// Maximum number of idle connections per host.
    pub max_connections_per_host: usize,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(60),
            max_retries: 5,
            retry_delay: Duration::from_millis(1500),
            max_connections_per_host: 100,
            user_agent: format!("td-job-results/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client for the job API.
///
/// This client handles:
/// - Connection pooling (via reqwest)
/// - Automatic retry with exponential backoff for transient failures
/// - `Authorization: TD1 <apikey>` header injection
/// - User-Agent header injection
pub struct TdHttpClient {
    client: Client,
    config: HttpClientConfig,
    auth_header: HeaderValue,
}

impl std::fmt::Debug for TdHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdHttpClient")
            .field("config", &self.config)
            .field("auth_header", &"TD1 ***")
            .finish()
    }
}

impl TdHttpClient {
    /// Creates a new HTTP client with the given configuration and API key.
    pub fn new(config: HttpClientConfig, apikey: &str) -> Result<Self> {
        if apikey.is_empty() {
            return Err(Error::InvalidConfig("API key is empty".to_string()));
        }
        let mut auth_header = HeaderValue::from_str(&format!("TD1 {}", apikey))
            .map_err(|_| Error::InvalidConfig("API key contains invalid characters".to_string()))?;
        auth_header.set_sensitive(true);

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            auth_header,
        })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Returns the underlying reqwest client for building requests.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the authorization header value.
    pub fn auth_header(&self) -> &HeaderValue {
        &self.auth_header
    }

    /// Execute an HTTP request with automatic retry logic and authentication.
    ///
    /// Retries are performed for:
    /// - Connect, timeout and request-building network errors
    /// - 429 Too Many Requests
    /// - 502 Bad Gateway
    /// - 503 Service Unavailable
    /// - 504 Gateway Timeout
    ///
    /// Non-idempotent requests (`POST`) are only retried when the server
    /// cannot have acted on them: connect failures and 429.
    ///
    /// A per-request timeout set on `request` is kept across attempts.
    ///
    /// A final non-success status becomes [`Error::RequestFailed`] carrying the
    /// response body as its message. The returned response has a success
    /// status and an unread body.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let mut attempts = 0;
        let mut last_error: Option<String> = None;

        // Clone the request parts we need for retries
        let method = request.method().clone();
        let url = request.url().clone();
        let headers = request.headers().clone();
        let timeout = request.timeout().copied();
        let body_bytes = request
            .body()
            .and_then(|b| b.as_bytes())
            .map(|b| b.to_vec());

        loop {
            attempts += 1;

            // Build a fresh request for this attempt
            let mut req_builder = self.client.request(method.clone(), url.clone());
            for (name, value) in headers.iter() {
                req_builder = req_builder.header(name, value);
            }
            req_builder = req_builder.header(AUTHORIZATION, self.auth_header.clone());
            if let Some(timeout) = timeout {
                req_builder = req_builder.timeout(timeout);
            }
            if let Some(ref body) = body_bytes {
                req_builder = req_builder.body(body.clone());
            }

            let request = req_builder
                .build()
                .map_err(|e| Error::Transport(format!("Failed to build request: {}", e)))?;

            debug!(
                "Executing {} {} (attempt {}/{})",
                method,
                url.path(),
                attempts,
                self.config.max_retries + 1
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if Self::should_retry_status(&method, status)
                        && attempts <= self.config.max_retries
                    {
                        warn!(
                            "Request failed with {} (attempt {}/{}), retrying...",
                            status,
                            attempts,
                            self.config.max_retries + 1
                        );
                        self.wait_for_retry(attempts).await;
                        continue;
                    }

                    // Non-retryable HTTP error or max retries exceeded
                    let error_body = response.text().await.unwrap_or_default();
                    return Err(Error::RequestFailed {
                        status: status.as_u16(),
                        message: Self::error_message(status, &error_body),
                    });
                }
                Err(e) => {
                    if Self::should_retry_error(&method, &e) && attempts <= self.config.max_retries
                    {
                        last_error = Some(e.to_string());
                        warn!(
                            "Request failed with error (attempt {}/{}): {}, retrying...",
                            attempts,
                            self.config.max_retries + 1,
                            e
                        );
                        self.wait_for_retry(attempts).await;
                        continue;
                    }

                    return Err(Error::Transport(format!(
                        "HTTP request failed after {} attempts: {}",
                        attempts,
                        last_error.unwrap_or_else(|| e.to_string())
                    )));
                }
            }
        }
    }

    /// Error text for a failed response: the body, or the canonical reason
    /// when the body is empty.
    fn error_message(status: StatusCode, body: &str) -> String {
        let body = body.trim();
        if body.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            body.to_string()
        }
    }

    /// Check if the HTTP status code indicates a retryable error.
    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
                | StatusCode::BAD_GATEWAY
        )
    }

    /// Check if the request error is retryable.
    fn is_retryable_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }

    /// Whether a response with `status` may be retried for `method`.
    fn should_retry_status(method: &Method, status: StatusCode) -> bool {
        Self::is_retryable_status(status)
            && (method.is_idempotent() || status == StatusCode::TOO_MANY_REQUESTS)
    }

    /// Whether a failed attempt may be retried for `method`.
    fn should_retry_error(method: &Method, error: &reqwest::Error) -> bool {
        Self::is_retryable_error(error) && (method.is_idempotent() || error.is_connect())
    }

    /// Wait with exponential backoff before retry.
    async fn wait_for_retry(&self, attempt: u32) {
        let delay = self.config.retry_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        debug!("Waiting {:?} before retry", delay);
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_connections_per_host, 100);
        assert!(config.user_agent.starts_with("td-job-results/"));
    }

    #[test]
    fn test_is_retryable_status() {
        assert!(TdHttpClient::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(TdHttpClient::is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(TdHttpClient::is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(TdHttpClient::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!TdHttpClient::is_retryable_status(StatusCode::OK));
        assert!(!TdHttpClient::is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!TdHttpClient::is_retryable_status(
            StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[test]
    fn test_post_retried_only_when_not_processed() {
        let post = Method::POST;
        assert!(TdHttpClient::should_retry_status(
            &post,
            StatusCode::TOO_MANY_REQUESTS
        ));
        assert!(!TdHttpClient::should_retry_status(
            &post,
            StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(!TdHttpClient::should_retry_status(
            &post,
            StatusCode::GATEWAY_TIMEOUT
        ));
        assert!(TdHttpClient::should_retry_status(
            &Method::GET,
            StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(!TdHttpClient::should_retry_status(
            &Method::GET,
            StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        assert_eq!(
            TdHttpClient::error_message(StatusCode::NOT_FOUND, "  "),
            "Not Found"
        );
        assert_eq!(
            TdHttpClient::error_message(StatusCode::NOT_FOUND, "{\"error\":\"no job\"}\n"),
            "{\"error\":\"no job\"}"
        );
    }

    #[tokio::test]
    async fn test_auth_header() {
        let client = TdHttpClient::new(HttpClientConfig::default(), "1/abcdef").unwrap();
        assert_eq!(client.auth_header().to_str().unwrap(), "TD1 1/abcdef");
        assert!(client.auth_header().is_sensitive());
        assert!(!format!("{:?}", client).contains("abcdef"));
    }

    #[tokio::test]
    async fn test_rejects_empty_apikey() {
        let err = TdHttpClient::new(HttpClientConfig::default(), "").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
