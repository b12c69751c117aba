//! Backend endpoint wrappers

use super::types::{ChatRequest, ChatResponse, HealthResponse, ScreenState};
use crate::http::{RequestDescriptor, RequestError, ResilientClient, RetryPolicy};
use serde_json::Value;
use tracing::debug;

/// Client for the backend's HTTP endpoints.
///
/// Every call goes through the resilient request client; the retry budget is
/// set per endpoint (the health probe is single-attempt).
#[derive(Clone)]
pub struct BackendApi {
    client: ResilientClient,
    base_url: String,
    retry: RetryPolicy,
}

impl BackendApi {
    pub fn new(client: ResilientClient, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /gr2/chat` — screen-aware chat
    pub async fn chat(
        &self,
        message: &str,
        screen_state: &ScreenState,
    ) -> Result<ChatResponse, RequestError> {
        let body = serde_json::to_value(ChatRequest {
            message: message.to_string(),
            screen_state: screen_state.clone(),
        })
        .map_err(|e| RequestError::Network(format!("encode chat request: {e}")))?;

        let request = RequestDescriptor::post(self.endpoint("/gr2/chat"), body)
            .with_retry(self.retry.clone());
        let response = self.client.execute(&request).await?;

        response
            .json::<ChatResponse>()
            .map_err(|e| RequestError::Network(format!("malformed chat response: {e}")))
    }

    /// `GET /gr2/health` — lightweight availability probe, single attempt
    pub async fn health(&self) -> Result<HealthResponse, RequestError> {
        let request =
            RequestDescriptor::get(self.endpoint("/gr2/health")).with_retry(RetryPolicy::none());
        let response = self.client.execute(&request).await?;

        response
            .json::<HealthResponse>()
            .map_err(|e| RequestError::Network(format!("malformed health response: {e}")))
    }

    /// `POST /sandbox/trades/execute` — opaque trading glue
    pub async fn execute_trade(&self, payload: Value) -> Result<Value, RequestError> {
        self.post_passthrough("/sandbox/trades/execute", payload)
            .await
    }

    /// `POST /sandbox/update-account` — opaque trading glue
    pub async fn update_account(&self, payload: Value) -> Result<Value, RequestError> {
        self.post_passthrough("/sandbox/update-account", payload)
            .await
    }

    async fn post_passthrough(&self, path: &str, payload: Value) -> Result<Value, RequestError> {
        let request =
            RequestDescriptor::post(self.endpoint(path), payload).with_retry(self.retry.clone());
        let response = self.client.execute(&request).await?;
        debug!(path, status = response.status, "sandbox call completed");

        response
            .json::<Value>()
            .map_err(|e| RequestError::Network(format!("malformed response from {path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join_trims_trailing_slash() {
        let api = BackendApi::new(
            ResilientClient::with_reqwest(),
            "http://localhost:8000/",
            RetryPolicy::default(),
        );
        assert_eq!(api.endpoint("/gr2/chat"), "http://localhost:8000/gr2/chat");

        let api = BackendApi::new(
            ResilientClient::with_reqwest(),
            "http://localhost:8000",
            RetryPolicy::default(),
        );
        assert_eq!(api.endpoint("/gr2/health"), "http://localhost:8000/gr2/health");
    }
}
