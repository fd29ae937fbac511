//! Error types for the event source.
//!
//! Transport failures travel inside error-category [`Event`](crate::Event)s, so
//! [`TransportError`] is `Clone` and carries only owned, comparable data.

use core::str::Utf8Error;

use thiserror::Error;

/// Result type for fallible construction of an event source.
pub type EventSourceResult<T> = Result<T, EventSourceError>;

/// Errors raised while building an [`EventSource`](crate::EventSource).
#[derive(Error, Debug)]
pub enum EventSourceError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No async runtime to drive transport, timers and dispatch
    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

impl EventSourceError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }
}

/// Failure of a streaming request, as reported by a
/// [`Transport`](crate::transport::Transport).
///
/// Always moves the connection into the error state and is surfaced to the
/// error observer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network or protocol failure from the HTTP client
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// The server answered with a non-success status
    #[error("SSE invalid status: {status}")]
    InvalidStatus { status: http::StatusCode },

    /// The server answered with something other than an event stream
    #[error("SSE invalid content type: {content_type}")]
    InvalidContentType { content_type: String },

    /// The server closed the stream
    #[error("SSE stream ended")]
    StreamEnded,

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The transport failed without saying why
    #[error("Unknown error")]
    Unknown,
}

impl TransportError {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Create an invalid status error.
    pub fn invalid_status(status: http::StatusCode) -> Self {
        Self::InvalidStatus { status }
    }

    /// Create an invalid content type error.
    pub fn invalid_content_type(content_type: impl Into<String>) -> Self {
        Self::InvalidContentType {
            content_type: content_type.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Normalise an optional transport error, substituting [`Self::Unknown`].
    pub fn or_unknown(error: Option<Self>) -> Self {
        error.unwrap_or(Self::Unknown)
    }
}

#[cfg(feature = "http-transport")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::http(e.to_string())
    }
}

/// A received chunk could not be decoded as UTF-8 text.
///
/// Recovered locally: the chunk is dropped and the connection state is left
/// untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("SSE chunk is not valid UTF-8: {0}")]
pub struct DecodeError(#[from] Utf8Error);

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EventSourceError::config("URL cannot be empty");
        assert!(matches!(err, EventSourceError::Config { .. }));
        assert_eq!(err.to_string(), "Configuration error: URL cannot be empty");

        let err = TransportError::timeout(Duration::from_secs(5));
        assert!(matches!(err, TransportError::Timeout { .. }));

        let err = TransportError::invalid_status(http::StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "SSE invalid status: 403 Forbidden");
    }

    #[test]
    fn test_missing_error_is_normalised() {
        assert_eq!(TransportError::or_unknown(None), TransportError::Unknown);
        assert_eq!(
            TransportError::or_unknown(Some(TransportError::StreamEnded)),
            TransportError::StreamEnded
        );
    }

    #[test]
    fn test_decode_error_display() {
        let bytes = [0xff_u8, 0xfe];
        let err = DecodeError::from(core::str::from_utf8(&bytes).expect_err("invalid utf-8"));
        assert!(err.to_string().starts_with("SSE chunk is not valid UTF-8"));
    }
}
