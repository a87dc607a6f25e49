//! Resilient request client for the financial data API
//!
//! Every endpoint wrapper funnels through [`ResilientClient::fetch`]:
//! authenticated GET, bounded linear backoff, per-attempt timeout.
//! Terminal failures are returned as values, never raised.

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Result of a logical upstream query: decoded JSON or a classified failure
pub type RequestOutcome = std::result::Result<Value, RequestFailure>;

/// Classified failure of an upstream request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    #[error("Rate limited by upstream (HTTP 429)")]
    RateLimited,

    #[error("Upstream server error (HTTP {code})")]
    ServerError { code: u16 },

    #[error("Request timed out")]
    Timeout,

    #[error("Client error (HTTP {code})")]
    ClientError { code: u16 },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Invalid response body: {message}")]
    InvalidBody { message: String },

    #[error("Max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },
}

impl RequestFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestFailure::RateLimited => "rate_limited",
            RequestFailure::ServerError { .. } => "server_error",
            RequestFailure::Timeout => "timeout",
            RequestFailure::ClientError { .. } => "client_error",
            RequestFailure::NetworkError { .. } => "network_error",
            RequestFailure::InvalidBody { .. } => "invalid_body",
            RequestFailure::MaxRetriesExceeded { .. } => "max_retries_exceeded",
        }
    }

    /// Error object handed to callers that expect a JSON document
    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let RequestFailure::ClientError { code } | RequestFailure::ServerError { code } = self {
            value["status_code"] = json!(code);
        }
        value
    }
}

/// Retry configuration for [`ResilientClient`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt, or `None` when the failure is terminal.
    ///
    /// Rate limits back off linearly (`retry_delay * attempt`); server errors
    /// and timeouts wait a constant `retry_delay`.
    pub fn delay_after(&self, failure: &RequestFailure, attempt: u32) -> Option<Duration> {
        match failure {
            RequestFailure::RateLimited => Some(self.retry_delay * attempt),
            RequestFailure::ServerError { .. } | RequestFailure::Timeout => Some(self.retry_delay),
            _ => None,
        }
    }
}

/// Append the API key as a query parameter.
pub fn authenticated_url(url: &str, api_key: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}apikey={}", url, separator, api_key)
}

/// Connection-pooled GET client with retry and backoff
pub struct ResilientClient {
    client: Client,
    api_key: String,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_policy(api_key, RetryPolicy::default())
    }

    pub fn with_policy(api_key: impl Into<String>, policy: RetryPolicy) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build pooled HTTP client, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            api_key: api_key.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Issue an authenticated GET and return parsed JSON or a classified failure.
    pub async fn fetch(&self, url: &str) -> RequestOutcome {
        let full_url = authenticated_url(url, &self.api_key);
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, url = %url, "Fetching upstream data");

            let failure = match self.attempt(&full_url).await {
                Ok(value) => {
                    info!(attempt, url = %url, "Upstream request succeeded");
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let Some(delay) = self.policy.delay_after(&failure, attempt) else {
                warn!(attempt, url = %url, error = %failure, "Upstream request failed, not retrying");
                return Err(failure);
            };

            if attempt == max_attempts {
                if failure == RequestFailure::Timeout {
                    error!(attempts = attempt, url = %url, "Upstream request timed out on every attempt");
                    return Err(RequestFailure::Timeout);
                }
                break;
            }

            warn!(
                attempt,
                max_attempts,
                url = %url,
                error = %failure,
                delay_ms = delay.as_millis() as u64,
                "Retrying upstream request"
            );
            tokio::time::sleep(delay).await;
        }

        error!(attempts = max_attempts, url = %url, "Max retries exceeded");
        Err(RequestFailure::MaxRetriesExceeded {
            attempts: max_attempts,
        })
    }

    async fn attempt(&self, url: &str) -> RequestOutcome {
        let response = match self
            .client
            .get(url)
            .timeout(self.policy.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(RequestFailure::Timeout),
            // The URL carries the API key
            Err(e) => {
                return Err(RequestFailure::NetworkError {
                    message: e.without_url().to_string(),
                })
            }
        };

        match response.status().as_u16() {
            200 => response.json::<Value>().await.map_err(|e| {
                if e.is_timeout() {
                    RequestFailure::Timeout
                } else {
                    RequestFailure::InvalidBody {
                        message: e.without_url().to_string(),
                    }
                }
            }),
            429 => Err(RequestFailure::RateLimited),
            code if code >= 500 => Err(RequestFailure::ServerError { code }),
            code => Err(RequestFailure::ClientError { code }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_millis(5),
            timeout: Duration::from_millis(500),
        }
    }

    fn test_client() -> ResilientClient {
        ResilientClient::with_policy("test-key", fast_policy())
    }

    #[test]
    fn test_api_key_appended_with_question_mark() {
        assert_eq!(
            authenticated_url("https://host/api/v3/quote/AAPL", "k"),
            "https://host/api/v3/quote/AAPL?apikey=k"
        );
    }

    #[test]
    fn test_api_key_appended_with_ampersand() {
        assert_eq!(
            authenticated_url("https://host/api/v3/income-statement/AAPL?period=annual", "k"),
            "https://host/api/v3/income-statement/AAPL?period=annual&apikey=k"
        );
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            retry_delay: Duration::from_secs(1),
            ..RetryPolicy::default()
        };

        assert_eq!(
            policy.delay_after(&RequestFailure::RateLimited, 1),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            policy.delay_after(&RequestFailure::RateLimited, 2),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            policy.delay_after(&RequestFailure::ServerError { code: 503 }, 2),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            policy.delay_after(&RequestFailure::Timeout, 3),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            policy.delay_after(&RequestFailure::ClientError { code: 404 }, 1),
            None
        );
    }

    #[test]
    fn test_failure_json_shape() {
        let value = RequestFailure::ClientError { code: 404 }.to_json();
        assert_eq!(value["kind"], "client_error");
        assert_eq!(value["status_code"], 404);
        assert!(value["error"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_success_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote/AAPL"))
            .and(query_param("apikey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"symbol": "AAPL", "price": 190.5}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let value = assert_ok!(test_client().fetch(&format!("{}/quote/AAPL", server.uri())).await);
        assert_eq!(value[0]["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_with_linear_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let started = Instant::now();
        let failure = assert_err!(test_client().fetch(&format!("{}/quote/AAPL", server.uri())).await);

        assert_eq!(failure, RequestFailure::MaxRetriesExceeded { attempts: 3 });
        // 5ms after attempt 1, 10ms after attempt 2, nothing after the last
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let value = assert_ok!(test_client().fetch(&format!("{}/profile/MSFT", server.uri())).await);
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_server_error_retries_three_times() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let failure = assert_err!(test_client().fetch(&format!("{}/quote/AAPL", server.uri())).await);
        assert_eq!(failure, RequestFailure::MaxRetriesExceeded { attempts: 3 });
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let failure = assert_err!(test_client().fetch(&format!("{}/missing", server.uri())).await);
        assert_eq!(failure, RequestFailure::ClientError { code: 404 });
    }

    #[tokio::test]
    async fn test_timeout_on_every_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(3)
            .mount(&server)
            .await;

        let client = ResilientClient::with_policy(
            "test-key",
            RetryPolicy {
                timeout: Duration::from_millis(50),
                ..fast_policy()
            },
        );

        let failure = assert_err!(client.fetch(&format!("{}/slow", server.uri())).await);
        assert_eq!(failure, RequestFailure::Timeout);
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let failure = assert_err!(test_client().fetch(&format!("{}/quote/AAPL", server.uri())).await);
        assert_eq!(failure.kind(), "invalid_body");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let failure = assert_err!(test_client().fetch("http://127.0.0.1:1/quote/AAPL").await);
        assert_eq!(failure.kind(), "network_error");
    }

    #[tokio::test]
    async fn test_network_failure_does_not_expose_api_key() {
        let client = ResilientClient::with_policy("SECRET123", fast_policy());

        let failure = assert_err!(client.fetch("http://127.0.0.1:1/quote/AAPL").await);

        assert!(!failure.to_string().contains("SECRET123"));
        assert!(!failure.to_json().to_string().contains("SECRET123"));
    }
}
