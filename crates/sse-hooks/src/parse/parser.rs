//! Line-level parser for SSE.
//!
//! Lines are cut on raw CR/LF bytes, which never occur inside a multi-byte
//! UTF-8 sequence, so decoding each line on its own gives the same text a
//! streaming decoder would.

use bytes::{Buf, BytesMut};

use super::constants::{CR, LF};

/// A full line from an SSE stream, borrowed from the buffer.
#[derive(Debug, Clone, Copy)]
enum RawEventLine<'a> {
    /// Comment line (starts with `:`)
    Comment,
    /// A field line with optional value.
    Field {
        field_name: &'a [u8],
        field_value: Option<&'a [u8]>,
    },
    /// An empty line (event delimiter).
    Empty,
}

/// Valid field names per the
/// [HTML standard](https://html.spec.whatwg.org/multipage/server-sent-events.html#event-stream-interpretation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    Ignored,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Self {
        match name {
            b"event" => Self::Event,
            b"data" => Self::Data,
            b"id" => Self::Id,
            b"retry" => Self::Retry,
            _ => Self::Ignored,
        }
    }
}

/// Completely parsed SSE event line with its value decoded to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EventLine {
    Comment,
    Empty,
    Field {
        field_name: FieldName,
        field_value: Option<String>,
    },
}

/// Finds the next end-of-line in `bytes`.
///
/// Returns `(line_end, remainder_start)`: the non-inclusive end of the line
/// and the inclusive start of the remainder. Returns `None` if more data is
/// needed (e.g. buffer ends with a lone CR that could be part of a CRLF pair).
fn find_eol(bytes: &[u8]) -> Option<(usize, usize)> {
    let first_match = memchr::memchr2(CR, LF, bytes)?;

    if bytes[first_match] == LF {
        return Some((first_match, first_match + 1));
    }

    // CR: need more data to see if it's CRLF or just CR
    match bytes.get(first_match + 1) {
        None => None,
        Some(&LF) => Some((first_match, first_match + 2)),
        Some(_) => Some((first_match, first_match + 1)),
    }
}

fn read_line(bytes: &[u8]) -> RawEventLine<'_> {
    match memchr::memchr(b':', bytes) {
        Some(0) => RawEventLine::Comment,
        Some(colon_pos) => {
            let value = &bytes[colon_pos + 1..];
            // Strip single leading space if present.
            let value = match value {
                [b' ', rest @ ..] => rest,
                _ => value,
            };
            RawEventLine::Field {
                field_name: &bytes[..colon_pos],
                field_value: Some(value),
            }
        }
        None if bytes.is_empty() => RawEventLine::Empty,
        None => RawEventLine::Field {
            field_name: bytes,
            field_value: None,
        },
    }
}

/// Reads the next [`EventLine`] from the buffer, then advances the buffer past
/// the corresponding EOL.
///
/// Returns `None` if the buffer contains no complete line terminator.
pub(crate) fn parse_line_from_buffer(buffer: &mut BytesMut) -> Option<EventLine> {
    let (line_end, rem_start) = find_eol(buffer)?;

    let line = buffer.split_to(line_end);
    buffer.advance(rem_start - line_end);

    Some(match read_line(&line) {
        RawEventLine::Comment => EventLine::Comment,
        RawEventLine::Empty => EventLine::Empty,
        RawEventLine::Field {
            field_name,
            field_value,
        } => EventLine::Field {
            field_name: FieldName::from_bytes(field_name),
            field_value: field_value.map(|v| String::from_utf8_lossy(v).into_owned()),
        },
    })
}
