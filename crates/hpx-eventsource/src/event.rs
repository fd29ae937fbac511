//! Core type definitions: connection state and delivered events.

use std::fmt;

use bytes_utils::Str;

use crate::error::TransportError;

/// Connection state machine states.
///
/// Owned by the [`EventSource`](crate::EventSource); observers see it through
/// [`Event::ready_state`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never opened.
    #[default]
    Default,
    /// A streaming request is in flight, no bytes received yet.
    Connecting,
    /// Receiving bytes.
    Open,
    /// Closed by the caller. Terminal until `open()` is called again.
    Closed,
    /// The last stream failed or ended; a reconnect may be pending.
    Error,
}

impl ConnectionState {
    /// Returns `true` while a stream is being established or read.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Returns `true` if the connection was closed by the caller.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Lowercase name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery category of an [`Event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The first bytes of a stream arrived.
    Open,
    /// An event block parsed from the wire.
    Message,
    /// The caller closed the connection.
    Close,
    /// The stream failed or ended.
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Message => write!(f, "message"),
            Self::Close => write!(f, "close"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One delivered occurrence: either a parsed event block or a lifecycle
/// transition.
///
/// Fields are absent when the server did not send them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Connection state at the time the event was emitted.
    pub ready_state: ConnectionState,
    /// The `id` field.
    pub id: Option<Str>,
    /// The `event` field. Absent means the default `message` type.
    pub name: Option<Str>,
    /// The `data` field, undecoded.
    pub data: Option<Str>,
    /// Set only on error-category events.
    pub error: Option<TransportError>,
}

impl Event {
    /// A lifecycle event carrying no fields.
    pub(crate) fn lifecycle(ready_state: ConnectionState) -> Self {
        Self {
            ready_state,
            id: None,
            name: None,
            data: None,
            error: None,
        }
    }

    /// An error-category event.
    pub(crate) fn failure(error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Self::lifecycle(ConnectionState::Error)
        }
    }

    /// Convenience accessor for the id field.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Convenience accessor for the event name field.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Convenience accessor for the data field.
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Event type, falling back to `"message"` when no name was sent.
    pub fn event_type(&self) -> &str {
        self.name().unwrap_or("message")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Default.to_string(), "default");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Open.is_active());
        assert!(!ConnectionState::Error.is_active());
        assert!(!ConnectionState::Default.is_active());
        assert!(ConnectionState::Closed.is_closed());
        assert_eq!(ConnectionState::default(), ConnectionState::Default);
    }

    #[test]
    fn test_event_accessors() {
        let event = Event {
            ready_state: ConnectionState::Open,
            id: Some(Str::from("evt-1")),
            name: Some(Str::from("greet")),
            data: Some(Str::from("hi")),
            error: None,
        };

        assert_eq!(event.id(), Some("evt-1"));
        assert_eq!(event.name(), Some("greet"));
        assert_eq!(event.data(), Some("hi"));
        assert_eq!(event.event_type(), "greet");
    }

    #[test]
    fn test_unnamed_event_is_message() {
        let event = Event::lifecycle(ConnectionState::Open);
        assert_eq!(event.event_type(), "message");
        assert!(event.id().is_none());
        assert!(event.data().is_none());
    }

    #[test]
    fn test_failure_event() {
        let event = Event::failure(TransportError::StreamEnded);
        assert_eq!(event.ready_state, ConnectionState::Error);
        assert_eq!(event.error, Some(TransportError::StreamEnded));
        assert!(event.name.is_none());
    }
}
