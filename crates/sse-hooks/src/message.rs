//! Messages produced by the frame parser and the plugin `on_message` verdict.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Data payload that streaming chat servers send to mark the end of a turn.
///
/// This is a convention of the consuming layer, not of the SSE standard: the
/// engine dispatches such a message like any other.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One parsed SSE frame.
///
/// Built by the frame parser and never mutated afterwards; a plugin that wants
/// a different message returns a new one via [`MessageAction::Forward`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseMessage {
    /// Event name, `"message"` when the frame carried no `event:` field.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Last event id seen on this stream, if any.
    pub id: Option<String>,
    /// Reconnection time in milliseconds advertised by the server.
    pub retry: Option<u64>,
}

impl SseMessage {
    /// Event name used when a frame does not name one.
    pub const DEFAULT_EVENT: &'static str = "message";

    /// Create a message with the given event name and data.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// Create a default-named (`"message"`) message.
    pub fn data(data: impl Into<String>) -> Self {
        Self::new(Self::DEFAULT_EVENT, data)
    }

    /// Set the event id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the retry hint.
    #[must_use]
    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// Returns `true` if the payload is the [`DONE_SENTINEL`].
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }

    /// Deserialize the data payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.data)
    }
}

/// What an `on_message` hook decided to do with a message.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageAction {
    /// Replace the message; the next hook sees the replacement.
    Forward(SseMessage),
    /// Pass the message on as it is.
    Unchanged,
    /// Discard the message. No later hook, listener or latest-message slot
    /// sees it.
    Drop,
}
