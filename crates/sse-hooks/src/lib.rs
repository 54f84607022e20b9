//! # sse-hooks
//!
//! Plugin-driven Server-Sent Events client engine.
//!
//! One [`SseClient`] owns a single streaming HTTP request at a time, parses
//! the `text/event-stream` body into [`SseMessage`]s and routes them to named
//! listeners. Plugins hook into every step of the connection lifecycle.
//!
//! ## Features
//!
//! - **Streaming Parser**: Chunk-boundary independent, never fails on bad input
//! - **Plugin Pipeline**: Ordered `before_connect` / `on_open` / `on_message` /
//!   `on_error` / `on_close` hooks with message rewrite and drop
//! - **Attempt Supersession**: A new connect silences everything the previous
//!   attempt would still have produced
//! - **Built-in Policies**: Retry, authorization header and logging plugins
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sse_hooks::{AuthPlugin, RetryPlugin, SseClient, SseConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SseConfig::new("http://localhost:3000/sse/stream").manual(true);
//!
//!     let client = SseClient::builder(config)
//!         .plugin(AuthPlugin::new("my-token"))
//!         .plugin(RetryPlugin::new().max_retries(5))
//!         .event_listener("status", |m| println!("status: {}", m.data))
//!         .on_message(|m| println!("{}: {}", m.event, m.data))
//!         .build()?;
//!
//!     client.connect(Some(serde_json::json!({"prompt": "hello"}).into()));
//!
//!     let mut latest = client.subscribe_latest();
//!     while latest.changed().await.is_ok() {
//!         if latest.borrow().as_ref().is_some_and(|m| m.is_done()) {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
mod dispatch;
pub mod error;
pub mod message;
pub mod parse;
pub mod plugin;
pub mod plugins;
pub mod state;
pub mod transport;

// Re-export commonly used types
pub use client::{CloseCallback, ErrorCallback, OpenCallback, SseClient, SseClientBuilder};
pub use config::{RequestBody, SseConfig};
pub use dispatch::MessageCallback;
pub use error::{HookError, TransportError, TransportResult};
pub use message::{DONE_SENTINEL, MessageAction, SseMessage};
pub use plugin::{Plugin, PluginContext, PluginHooks};
pub use plugins::{AuthPlugin, LogPlugin, RetryPlugin, TokenSource};
pub use state::ConnectionState;
pub use transport::{Connector, OpenInfo, OpenedStream, ReqwestConnector, SseRequest};
