//! One-shot request executor with bounded retry and backoff

use super::error::RequestError;
use super::transport::{HttpTransport, TransportFailure};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP method for a request descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Retry budget for one logical request
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, inclusive of the first try
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform random delay added to each backoff.
    /// Zero disables jitter.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Single-attempt policy (no retries)
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Deterministic part of the delay after failed attempt `attempt` (1-indexed):
    /// `min(base_delay * 2^(attempt-1), max_delay)`
    pub(crate) fn backoff_base(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Full delay after failed attempt `attempt`, with jitter applied
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = (rand::random::<f64>() * self.jitter.as_millis() as f64) as u64;
        base + Duration::from_millis(jitter_ms)
    }
}

/// A single outgoing call: target, method, payload, header overrides, and
/// retry budget. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: Method,
    pub body: Option<serde_json::Value>,
    /// Header overrides; replace defaults on name collision
    pub headers: Vec<(String, String)>,
    pub retry: RetryPolicy,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            body: None,
            headers: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            body: Some(body),
            headers: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Headers actually sent: `Content-Type: application/json` by default,
    /// overridden per call when the caller supplies its own value.
    pub fn effective_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        let has_content_type = self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        headers.extend(self.headers.iter().cloned());
        headers
    }
}

/// Successful response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Executes one logical request with automatic retry on transient failure.
///
/// Permanent classifications (4xx, policy-blocked) short-circuit the loop
/// immediately, even on the first attempt of a multi-attempt budget. On
/// exhaustion the last classified error is returned, never swallowed.
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn HttpTransport>,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Production wiring over a shared reqwest client
    pub fn with_reqwest() -> Self {
        Self::new(Arc::new(super::transport::ReqwestTransport::new()))
    }

    pub async fn execute(&self, request: &RequestDescriptor) -> Result<Response, RequestError> {
        let max_attempts = request.retry.max_attempts.max(1);
        let mut last_error = RequestError::Network("no attempt executed".into());

        for attempt in 1..=max_attempts {
            match self.transport.send(request).await {
                Ok(raw) => match RequestError::from_status(raw.status) {
                    None => {
                        return Ok(Response {
                            status: raw.status,
                            body: raw.body,
                        });
                    }
                    Some(err) if !err.is_transient() => {
                        warn!(url = %request.url, %err, "permanent request failure, not retrying");
                        return Err(err);
                    }
                    Some(err) => last_error = err,
                },
                Err(TransportFailure::Blocked(reason)) => {
                    warn!(url = %request.url, %reason, "request blocked, not retrying");
                    return Err(RequestError::BlockedByPolicy(reason));
                }
                Err(TransportFailure::Network(reason)) => {
                    last_error = RequestError::Network(reason);
                }
            }

            if attempt < max_attempts {
                let delay = request.retry.backoff_delay(attempt);
                debug!(
                    url = %request.url,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "transient request failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(url = %request.url, error = %last_error, "retry budget exhausted");
        Err(last_error)
    }
}
