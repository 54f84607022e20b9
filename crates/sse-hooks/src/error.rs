//! Error handling for the SSE engine.
//!
//! Two families live here: [`TransportError`], which is what a connection
//! attempt can fail with and what reaches `on_error`, and [`HookError`], which
//! a plugin hook returns and which never leaves the plugin pipeline.

use std::time::Duration;

use thiserror::Error;

/// The main result type used throughout the engine.
pub type TransportResult<T> = Result<T, TransportError>;

/// Everything that can end a connection attempt.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network-level failure (wraps `reqwest::Error`)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response headers arrived with a non-2xx status
    #[error("SSE request failed: {status}")]
    Status { status: http::StatusCode },

    /// The response carried no body to stream from
    #[error("Response body is empty")]
    EmptyBody,

    /// The response headers did not arrive in time
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A header name or value could not be encoded
    #[error("Invalid header: {message}")]
    InvalidHeader { message: String },

    /// Request body serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The body stream broke after the connection opened
    #[error("Stream error: {message}")]
    Stream { message: String },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<http::header::InvalidHeaderName> for TransportError {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        Self::invalid_header(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for TransportError {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::invalid_header(e.to_string())
    }
}

impl TransportError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a non-success status error.
    pub fn status(status: http::StatusCode) -> Self {
        Self::Status { status }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a body stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for failures of the request itself (network, status,
    /// missing body, stream breakage) as opposed to local misconfiguration.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Config { .. })
    }

    /// The HTTP status, if the server answered with a non-2xx response.
    pub fn status_code(&self) -> Option<http::StatusCode> {
        match self {
            Self::Status { status } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

/// Error type for plugin hook operations.
///
/// A hook returning one of these is logged and skipped; the remaining hooks in
/// the same chain still run.
#[derive(Debug, Error)]
pub enum HookError {
    /// Hook execution failed with a message.
    #[error("Hook failed: {message}")]
    Failed { message: String },

    /// Custom error from hook implementation.
    #[error("Hook error: {0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl HookError {
    /// Create a new failed hook error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Create a custom hook error.
    pub fn custom<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Custom(Box::new(error))
    }
}

impl From<TransportError> for HookError {
    fn from(e: TransportError) -> Self {
        Self::custom(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TransportError::config("URL cannot be empty");
        assert!(matches!(err, TransportError::Config { .. }));
        assert!(!err.is_transport());

        let err = TransportError::timeout(Duration::from_secs(5));
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(err.is_transport());

        let err = TransportError::status(http::StatusCode::FORBIDDEN);
        assert_eq!(err.status_code(), Some(http::StatusCode::FORBIDDEN));
        assert_eq!(err.to_string(), "SSE request failed: 403 Forbidden");
    }

    #[test]
    fn test_empty_body_message() {
        assert_eq!(
            TransportError::EmptyBody.to_string(),
            "Response body is empty"
        );
        assert!(TransportError::EmptyBody.status_code().is_none());
    }

    #[test]
    fn test_invalid_header_conversion() {
        let err: TransportError = http::HeaderName::from_bytes(b"bad header")
            .expect_err("space is not a valid header name byte")
            .into();
        assert!(matches!(err, TransportError::InvalidHeader { .. }));
    }

    #[test]
    fn test_hook_error_wraps_transport_error() {
        let err: HookError = TransportError::invalid_header("x").into();
        assert!(matches!(err, HookError::Custom(_)));
        assert_eq!(err.to_string(), "Hook error: Invalid header: x");
    }
}
