//! Connection state of an engine instance.

use std::fmt;

/// Connection state machine states.
///
/// `Closed → Connecting → Open → Closed`. Only the engine moves between them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Request issued, waiting for response headers.
    Connecting = 0,
    /// Response accepted, reading the event stream.
    Open = 1,
    /// Reserved for half-close support; the engine never enters it.
    Closing = 2,
    /// No attempt in flight. Initial and terminal state.
    #[default]
    Closed = 3,
}

impl ConnectionState {
    /// Returns `true` if the stream is being read.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if no attempt is in flight.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_closed() {
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
        assert!(ConnectionState::default().is_closed());
    }

    #[test]
    fn test_ready_state_numbering() {
        assert_eq!(ConnectionState::Connecting as u8, 0);
        assert_eq!(ConnectionState::Open as u8, 1);
        assert_eq!(ConnectionState::Closing as u8, 2);
        assert_eq!(ConnectionState::Closed as u8, 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Open.to_string(), "Open");
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }
}
