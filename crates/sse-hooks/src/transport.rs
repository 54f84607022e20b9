//! HTTP seam of the engine.
//!
//! A [`Connector`] issues the single streaming request of one connection
//! attempt. [`ReqwestConnector`] is the production implementation; tests and
//! embedders can plug in their own.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use http::{HeaderMap, StatusCode};

use crate::error::{TransportError, TransportResult};

/// Body stream of an open response.
pub type ByteStream = BoxStream<'static, TransportResult<Bytes>>;

/// A fully assembled request for one connection attempt.
#[derive(Clone, Debug)]
pub struct SseRequest {
    pub url: String,
    pub method: http::Method,
    /// Merged headers: base, then caller, then plugin-injected.
    pub headers: HeaderMap,
    pub body: Option<String>,
}

/// Status line and headers of an accepted response, handed to `on_open`.
#[derive(Clone, Debug)]
pub struct OpenInfo {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Response headers plus the still-unread body.
pub struct OpenedStream {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the response has no body to stream.
    pub body: Option<ByteStream>,
}

impl OpenedStream {
    /// Split into the metadata given to `on_open` and the body stream.
    pub fn into_parts(self) -> (OpenInfo, Option<ByteStream>) {
        (
            OpenInfo {
                status: self.status,
                headers: self.headers,
            },
            self.body,
        )
    }
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Issues the streaming request for a connection attempt.
///
/// Dropping the returned future, or the body stream, must abort the request;
/// the engine relies on that for cancellation.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Send the request and return once response headers are in.
    async fn open(&self, request: SseRequest) -> TransportResult<OpenedStream>;
}

/// [`Connector`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestConnector {
    client: reqwest::Client,
}

impl ReqwestConnector {
    /// Build a connector with a fresh client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Reuse an existing client (connection pool, proxy and TLS settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for ReqwestConnector {
    async fn open(&self, request: SseRequest) -> TransportResult<OpenedStream> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();

        let body = if status == StatusCode::NO_CONTENT || resp.content_length() == Some(0) {
            None
        } else {
            Some(
                resp.bytes_stream()
                    .map(|chunk| chunk.map_err(TransportError::from))
                    .boxed(),
            )
        };

        Ok(OpenedStream {
            status,
            headers,
            body,
        })
    }
}
