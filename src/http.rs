//! HTTP transport
//!
//! Thin wrapper over `reqwest` that applies the base URL, timeout, and fixed
//! headers to every request, and classifies failures into "no response"
//! (which feeds the retry policy) versus "HTTP response with an error status"
//! (which never does). Resilience decisions live in the orchestrator.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::time::Clock;

/// A request in transportable form
///
/// Descriptors are what the offline queue holds; they carry everything needed
/// to dispatch later without borrowing from the original call site.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// API path, e.g. "/products"
    pub path: String,
    /// Query parameters (unordered; cache keys normalize them)
    pub params: Vec<(String, String)>,
    /// JSON body for mutating requests
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// Describe a GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::GET, path: path.into(), params: Vec::new(), body: None }
    }

    /// Describe a POST request with a JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::POST, path: path.into(), params: Vec::new(), body: Some(body) }
    }

    /// Describe a PUT request with a JSON body
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::PUT, path: path.into(), params: Vec::new(), body: Some(body) }
    }

    /// Describe a DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self { method: Method::DELETE, path: path.into(), params: Vec::new(), body: None }
    }

    /// Attach query parameters
    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }
}

/// Dispatch failure classification
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No response was received (timeout, DNS failure, connection refused)
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a non-success status
    #[error("http status {status}")]
    Status { status: u16, body: String },

    /// The response body could not be parsed as JSON
    #[error("response decode failure: {0}")]
    Decode(String),
}

/// HTTP transport with fixed headers and timeout
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl HttpTransport {
    /// Build the transport from client configuration
    ///
    /// Every request carries `Content-Type`, `Accept`, `X-Client`, and
    /// `X-Client-Version`; the bearer header is attached per request. Latency
    /// is measured against the injected clock.
    pub fn new(config: &ClientConfig, clock: Arc<dyn Clock>) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Client",
            HeaderValue::from_str(&config.client_name)
                .map_err(|err| ClientError::Config(format!("invalid client name: {err}")))?,
        );
        headers.insert(
            "X-Client-Version",
            HeaderValue::from_str(&config.client_version)
                .map_err(|err| ClientError::Config(format!("invalid client version: {err}")))?,
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string(), clock })
    }

    /// Dispatch a single request
    ///
    /// Returns the parsed JSON payload on success; 204/205 yield `Null`.
    pub async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<Value, DispatchError> {
        let url = format!("{}{}", self.base_url, descriptor.path);
        let mut request = self.client.request(descriptor.method.clone(), &url);

        if !descriptor.params.is_empty() {
            request = request.query(&descriptor.params);
        }
        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let started = self.clock.now();
        let response = request
            .send()
            .await
            .map_err(|err| DispatchError::Transport(err.to_string()))?;

        let status = response.status();
        debug!(
            method = %descriptor.method,
            path = %descriptor.path,
            %status,
            elapsed_ms = self.clock.now().saturating_duration_since(started).as_millis() as u64,
            "request completed"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status { status: status.as_u16(), body });
        }

        if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            return Ok(Value::Null);
        }

        response.json().await.map_err(|err| DispatchError::Decode(err.to_string()))
    }
}
