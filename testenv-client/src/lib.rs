use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use testenv_common::BaseAddress;
use thiserror::Error;

pub mod matchers;
pub use matchers::{regex, RegexMatcher};

/// Upper bound on a single request, so a wedged server fails the test instead of hanging it.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error types for client-side helpers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid regex pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Result type for client-side helpers
pub type Result<T> = std::result::Result<T, ClientError>;

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResponse {
    pub status: u16,
    pub body: String,
}

impl TestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// HTTP client aimed at a test server's base address
pub struct TestClient {
    base: BaseAddress,
    http_client: reqwest::Client,
}

impl TestClient {
    pub fn new(base: &BaseAddress) -> Self {
        Self {
            base: base.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn base(&self) -> &BaseAddress {
        &self.base
    }

    /// Absolute URL for `path` under the base address.
    pub fn url(&self, path: &str) -> String {
        self.base.join(path)
    }

    pub async fn get(&self, path: &str) -> Result<TestResponse> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: impl Into<String>) -> Result<TestResponse> {
        self.send(Method::POST, path, Some(body.into())).await
    }

    pub async fn delete(&self, path: &str) -> Result<TestResponse> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<String>) -> Result<TestResponse> {
        let mut request = self
            .http_client
            .request(method, self.url(path))
            .timeout(REQUEST_TIMEOUT);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(TestResponse { status, body })
    }
}
