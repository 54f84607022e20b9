//! Inlined SSE parsing implementation.
//!
//! A self-contained Server-Sent Events parser based on the
//! [HTML Living Standard](https://html.spec.whatwg.org/multipage/server-sent-events.html),
//! tuned to never fail: invalid UTF-8 is replaced, malformed lines are
//! skipped, and only errors of the underlying byte stream surface.

pub(crate) mod constants;
pub mod event_stream;
pub mod frame;
pub(crate) mod parser;

pub use event_stream::EventStream;
pub use frame::FrameParser;
