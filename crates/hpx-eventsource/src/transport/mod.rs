//! Transport collaborator contract.
//!
//! The event source never performs I/O itself. It asks a [`Transport`] to open
//! a streaming request and receives bytes through a [`StreamSink`]. Each
//! opened stream is represented by a [`StreamHandle`] that aborts it.
//!
//! A transport must deliver every callback for one stream from one task, in
//! order, and report exactly one of [`StreamSink::on_complete`] or
//! [`StreamSink::on_error`] unless the stream is cancelled first.

#[cfg(feature = "http-transport")]
mod http;

use std::{fmt, sync::Arc};

use bytes::Bytes;
use ::http::HeaderMap;

#[cfg(feature = "http-transport")]
pub use self::http::HttpTransport;
use crate::error::TransportError;

/// A streaming request to open.
#[derive(Clone, Debug)]
pub struct StreamRequest {
    /// Endpoint URL.
    pub url: String,
    /// Complete outbound headers, including `Accept` and `Last-Event-ID`.
    pub headers: HeaderMap,
}

/// Receiver of one stream's bytes and terminal notification.
pub trait StreamSink: Send + Sync {
    /// A chunk of the response body arrived.
    fn on_chunk(&self, chunk: Bytes);

    /// The server ended the response normally.
    fn on_complete(&self);

    /// The request or the body failed. `None` means the transport has no
    /// error value to report.
    fn on_error(&self, error: Option<TransportError>);
}

/// Opens streaming requests on behalf of an event source.
pub trait Transport: Send + Sync + 'static {
    /// Start `request` and feed its body to `sink`.
    ///
    /// Must return without waiting for the network. Callbacks may start
    /// before this returns.
    fn open_stream(&self, request: StreamRequest, sink: Arc<dyn StreamSink>) -> StreamHandle;
}

/// Cancels an opened stream when cancelled or dropped.
pub struct StreamHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl StreamHandle {
    /// Create a handle running `cancel` once.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Create a handle aborting a tokio task.
    pub fn from_task(task: tokio::task::AbortHandle) -> Self {
        Self::new(move || task.abort())
    }

    /// Create a handle with nothing to cancel.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Abort the stream.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}
