//! SSE engine configuration.

use std::time::Duration;

use crate::error::TransportResult;

/// Body sent with each connection attempt.
///
/// Text is sent verbatim; JSON is serialized compactly.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
}

impl RequestBody {
    /// Render the body as the text written to the wire.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the JSON value cannot be encoded.
    pub fn to_text(&self) -> TransportResult<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Json(value) => Ok(serde_json::to_string(value)?),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Configuration for an [`SseClient`](crate::SseClient).
///
/// Provides sensible defaults and chainable setter methods.
#[derive(Clone, Debug)]
pub struct SseConfig {
    /// SSE endpoint URL.
    pub url: String,
    /// HTTP method (POST unless the endpoint wants something else).
    pub method: http::Method,
    /// Caller headers; they override the base headers and are overridden by
    /// plugin-injected ones.
    pub headers: http::HeaderMap,
    /// Body used when `connect` is called without one. Never sent with GET
    /// or HEAD.
    pub body: Option<RequestBody>,
    /// How long to wait for response headers. The open stream has no deadline.
    pub connect_timeout: Duration,
    /// When `false`, the client connects as soon as it is built.
    pub manual: bool,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: http::Method::POST,
            headers: http::HeaderMap::new(),
            body: None,
            connect_timeout: Duration::from_secs(10),
            manual: false,
        }
    }
}

impl SseConfig {
    /// Create a new SSE configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn method(mut self, method: http::Method) -> Self {
        self.method = method;
        self
    }

    /// Set the caller header layer.
    #[must_use]
    pub fn headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the default request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Only connect when `connect` is called explicitly.
    #[must_use]
    pub fn manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        Ok(())
    }
}
