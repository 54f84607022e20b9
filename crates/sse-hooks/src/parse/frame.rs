//! Push-style frame parser: raw byte chunks in, [`SseMessage`]s out.

use bytes::{Buf, BufMut, BytesMut};

use super::{
    constants::{BOM, CR, LF},
    parser::{EventLine, FieldName, parse_line_from_buffer},
};
use crate::message::SseMessage;

// ---------------------------------------------------------------------------
// FrameBuilder
// ---------------------------------------------------------------------------

/// Fields of the frame currently being assembled.
#[derive(Debug, Default, Clone)]
struct FrameBuilder {
    event: String,
    /// `None` until the first `data:` line; an empty frame dispatches nothing.
    data: Option<String>,
    retry: Option<u64>,
    /// Last event id buffer. Survives dispatch, as the HTML standard asks.
    last_event_id: String,
}

impl FrameBuilder {
    /// Apply one line. Returns a message when the line completes a frame.
    fn add(&mut self, line: EventLine) -> Option<SseMessage> {
        match line {
            EventLine::Empty => return self.dispatch(),
            EventLine::Field {
                field_name: FieldName::Event,
                field_value,
            } => {
                self.event = field_value.unwrap_or_default();
            }
            EventLine::Field {
                field_name: FieldName::Data,
                field_value,
            } => {
                let value = field_value.unwrap_or_default();
                match &mut self.data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(&value);
                    }
                    None => self.data = Some(value),
                }
            }
            EventLine::Field {
                field_name: FieldName::Id,
                field_value,
            } => {
                let value = field_value.unwrap_or_default();
                if memchr::memchr(0, value.as_bytes()).is_none() {
                    self.last_event_id = value;
                }
            }
            EventLine::Field {
                field_name: FieldName::Retry,
                field_value,
            } => {
                // ASCII digits only; `parse` alone would take a leading `+`.
                if let Some(value) = field_value
                    && !value.is_empty()
                    && value.bytes().all(|b| b.is_ascii_digit())
                    && let Ok(retry) = value.parse::<u64>()
                {
                    self.retry = Some(retry);
                }
            }
            // Comments and unknown fields are silently ignored.
            EventLine::Comment
            | EventLine::Field {
                field_name: FieldName::Ignored,
                ..
            } => {}
        }
        None
    }

    /// Dispatch the complete frame and reset per-frame fields.
    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = std::mem::take(&mut self.event);
        let retry = self.retry.take();
        let data = self.data.take()?;

        Some(SseMessage {
            event: if event.is_empty() {
                SseMessage::DEFAULT_EVENT.to_string()
            } else {
                event
            },
            data,
            id: (!self.last_event_id.is_empty()).then(|| self.last_event_id.clone()),
            retry,
        })
    }

    /// Forget the partial frame, keeping nothing.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// FrameParser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    /// Still looking for a BOM at the start of the stream.
    NotStarted,
    Started,
}

const fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    match buf.len() {
        0 => None,
        1 => {
            if buf[0] == BOM[0] {
                None
            } else {
                Some(false)
            }
        }
        2 => {
            if buf[0] == BOM[0] && buf[1] == BOM[1] {
                None
            } else {
                Some(false)
            }
        }
        _gte_3 => Some(buf[0] == BOM[0] && buf[1] == BOM[1] && buf[2] == BOM[2]),
    }
}

/// Incremental SSE frame parser.
///
/// Feed it chunks of any size; it returns every frame the chunk completed, in
/// arrival order. Malformed lines are skipped, so feeding never fails. One
/// instance serves one stream: make a new parser for every connection.
#[derive(Debug)]
pub struct FrameParser {
    buffer: BytesMut,
    builder: FrameBuilder,
    state: ParserState,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            builder: FrameBuilder::default(),
            state: ParserState::NotStarted,
        }
    }

    /// Feed one chunk and collect the frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        if self.state == ParserState::NotStarted {
            match starts_with_bom(&self.buffer) {
                Some(true) => {
                    self.state = ParserState::Started;
                    self.buffer.advance(BOM.len());
                }
                Some(false) => self.state = ParserState::Started,
                None => return Vec::new(),
            }
        }

        self.drain()
    }

    /// Signal end of stream.
    ///
    /// Completes a trailing line ended by a lone CR, returns any frame that
    /// line terminated, and throws away whatever partial frame is left. The
    /// parser is back to its initial state afterwards.
    pub fn finish(&mut self) -> Vec<SseMessage> {
        // The parser waits to see if a line is CR LF or just CR; once the
        // stream ends we know a trailing CR is standalone.
        if self.buffer.last() == Some(&CR) {
            self.buffer.put_u8(LF);
        }
        let messages = self.drain();

        self.buffer.clear();
        self.builder.reset();
        self.state = ParserState::NotStarted;
        messages
    }

    fn drain(&mut self) -> Vec<SseMessage> {
        let mut messages = Vec::new();
        while let Some(line) = parse_line_from_buffer(&mut self.buffer) {
            if let Some(message) = self.builder.add(line) {
                messages.push(message);
            }
        }
        messages
    }
}
