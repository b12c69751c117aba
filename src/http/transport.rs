//! Injected HTTP request primitive
//!
//! The retry loop in `ResilientClient` never talks to the network directly —
//! it goes through an `HttpTransport`, so the loop can be driven by
//! deterministic fakes in tests.

use super::client::{Method, RequestDescriptor};
use async_trait::async_trait;

/// Raw outcome of a single transport attempt that produced an HTTP response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Failure of an attempt before any HTTP status was received
#[derive(Debug, Clone)]
pub enum TransportFailure {
    /// The request was refused by client-side policy (never reached the wire)
    Blocked(String),
    /// No response: DNS, connect, timeout, broken connection
    Network(String),
}

/// One-shot request primitive. Implementations perform exactly one attempt;
/// retry policy lives in the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure>;
}

/// Production transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in request.effective_headers() {
            builder = builder.header(name, value);
        }

        if let Some(ref body) = request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() || e.is_redirect() {
                TransportFailure::Blocked(e.to_string())
            } else {
                TransportFailure::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportFailure::Network(e.to_string()))?;

        Ok(RawResponse { status, body })
    }
}
