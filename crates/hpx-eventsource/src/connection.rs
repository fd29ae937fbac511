//! Connection state machine.
//!
//! Provides [`EventSource`], which opens streams through a
//! [`Transport`], feeds received bytes to the [`StreamParser`], hands events to
//! the dispatch task and reconnects after failures.
//!
//! # Serialisation
//!
//! Public calls, transport callbacks and retry timers all mutate one
//! session behind a single mutex. Every opened stream gets a new
//! generation number; callbacks carrying an older generation are ignored.
//! The transport is only called with the lock released.
//!
//! ```text
//!  open() ──► Connecting ──first bytes──► Open ──failure/end──► Error
//!                 ▲                                              │
//!                 └──────────── retry timer (retry interval) ◄───┘
//!  close() ──► Closed (timer and stream cancelled, failures ignored)
//! ```

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, header};
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::watch};
use tracing::{debug, info, trace, warn};

use crate::{
    config::EventSourceConfig,
    dispatch::{Dispatcher, EventHandler},
    error::{EventSourceError, EventSourceResult, TransportError},
    event::{ConnectionState, Event, EventKind},
    parse::StreamParser,
    reconnect::Reconnector,
    transport::{StreamHandle, StreamRequest, StreamSink, Transport},
};

// ---------------------------------------------------------------------------
// Public API: EventSource
// ---------------------------------------------------------------------------

/// A reconnecting Server-Sent Events client.
///
/// `open()` and `close()` return immediately; all I/O happens on the tokio
/// runtime the source was created on. Observers run one at a time on a
/// dedicated dispatch task.
///
/// Dropping the source cancels its stream and any pending reconnect without
/// emitting a close event.
///
/// ```rust,no_run
/// use hpx_eventsource::{EventSource, EventSourceConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = EventSource::new(EventSourceConfig::new("https://example.com/stream"))?;
///
/// source.on_message(|event| println!("{:?}", event.data()));
/// source.add_handler("greet", |event| println!("greeted: {:?}", event.data()));
/// source.on_error(|event| eprintln!("stream failed: {:?}", event.error));
/// source.open();
/// # Ok(())
/// # }
/// ```
pub struct EventSource {
    inner: Arc<Inner>,
}

impl EventSource {
    /// Create an event source using the default [`HttpTransport`](crate::transport::HttpTransport).
    ///
    /// Must be called from within a tokio runtime. The source starts in
    /// [`ConnectionState::Default`]; call [`open()`](Self::open) to connect.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails or no runtime is
    /// available.
    #[cfg(feature = "http-transport")]
    pub fn new(config: EventSourceConfig) -> EventSourceResult<Self> {
        config.validate().map_err(EventSourceError::config)?;
        let transport = crate::transport::HttpTransport::new(&config)?;
        Self::with_transport(config, transport)
    }

    /// Create an event source on top of a custom transport.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails or no runtime is
    /// available.
    pub fn with_transport(
        config: EventSourceConfig,
        transport: impl Transport,
    ) -> EventSourceResult<Self> {
        config.validate().map_err(EventSourceError::config)?;
        let runtime = Handle::try_current()
            .map_err(|e| EventSourceError::runtime(format!("No tokio runtime: {e}")))?;

        let session = Session {
            state: ConnectionState::Default,
            parser: StreamParser::new(),
            last_event_id: config.last_event_id,
            retry_interval: config.retry_interval,
            generation: 0,
            stream: None,
            reconnector: Reconnector::default(),
        };
        let (state_tx, _) = watch::channel(ConnectionState::Default);
        let dispatcher = Dispatcher::spawn(&runtime);

        Ok(Self {
            inner: Arc::new(Inner {
                url: config.url,
                headers: config.headers,
                transport: Arc::new(transport),
                runtime,
                session: Mutex::new(session),
                state_tx,
                dispatcher,
            }),
        })
    }

    /// Open the stream.
    ///
    /// No-op while already connecting or open. Otherwise cancels any previous
    /// stream and pending reconnect and issues a new request, resuming from
    /// the last seen event id.
    pub fn open(&self) {
        self.inner.open();
    }

    /// Close the stream and stop reconnecting.
    ///
    /// Emits a close event unless already closed. Failures reported by the
    /// cancelled stream afterwards are ignored.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.session.lock().state
    }

    /// Subscribe to state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// The stream URL.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Id of the most recent event that carried one.
    pub fn last_event_id(&self) -> Option<String> {
        self.inner.session.lock().last_event_id.clone()
    }

    /// Delay applied before the next reconnect.
    pub fn retry_interval(&self) -> Duration {
        self.inner.session.lock().retry_interval
    }

    /// Set the observer for open events, replacing the previous one.
    pub fn on_open<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Open, Arc::new(handler));
    }

    /// Set the observer for every parsed event, replacing the previous one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Message, Arc::new(handler));
    }

    /// Set the observer for close events, replacing the previous one.
    pub fn on_close<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Close, Arc::new(handler));
    }

    /// Set the observer for error events, replacing the previous one.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Error, Arc::new(handler));
    }

    /// Add an observer for parsed events named `event_name`.
    ///
    /// Observers for the same name accumulate and run in registration order,
    /// after the message observer.
    pub fn add_handler<F>(&self, event_name: impl Into<String>, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let event_name = event_name.into();
        self.inner.dispatcher.register(|registry| {
            registry.add(event_name.as_str(), handler);
            debug!(
                event_name = %event_name,
                observers = registry.named_count(&event_name),
                "SSE named observer added"
            );
        });
    }

    fn set_handler(&self, kind: EventKind, handler: EventHandler) {
        self.inner
            .dispatcher
            .register(move |registry| registry.set(kind, handler));
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.inner.session.lock();
        f.debug_struct("EventSource")
            .field("url", &self.inner.url)
            .field("state", &session.state)
            .field("generation", &session.generation)
            .field("retry_pending", &session.reconnector.is_pending())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Internal: shared connection state
// ---------------------------------------------------------------------------

struct Inner {
    url: String,
    headers: HeaderMap,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
    dispatcher: Dispatcher,
}

/// Mutable per-connection state. Only touched with the session lock held.
struct Session {
    state: ConnectionState,
    parser: StreamParser,
    last_event_id: Option<String>,
    retry_interval: Duration,
    /// Generation of the most recently opened stream.
    generation: u64,
    stream: Option<StreamHandle>,
    reconnector: Reconnector,
}

/// A stream decided on under the lock, started after releasing it.
struct PendingOpen {
    generation: u64,
    request: StreamRequest,
    previous: Option<StreamHandle>,
}

impl Inner {
    fn open(self: &Arc<Self>) {
        let pending = {
            let mut session = self.session.lock();
            self.begin_open(&mut session)
        };
        if let Some(pending) = pending {
            self.start_stream(pending);
        }
    }

    fn begin_open(&self, session: &mut Session) -> Option<PendingOpen> {
        if session.state.is_active() {
            debug!(state = %session.state, "SSE open ignored, already active");
            return None;
        }

        let previous = session.stream.take();
        session.reconnector.cancel();
        session.parser.reset();
        session.generation += 1;
        self.set_state(session, ConnectionState::Connecting);

        info!(
            url = %self.url,
            generation = session.generation,
            last_event_id = ?session.last_event_id,
            "SSE connecting"
        );

        Some(PendingOpen {
            generation: session.generation,
            request: self.request(session),
            previous,
        })
    }

    fn start_stream(self: &Arc<Self>, pending: PendingOpen) {
        if let Some(previous) = pending.previous {
            previous.cancel();
        }

        let sink = Arc::new(SessionSink {
            inner: Arc::downgrade(self),
            generation: pending.generation,
        });
        let handle = self.transport.open_stream(pending.request, sink);

        let mut session = self.session.lock();
        if session.generation == pending.generation && session.state.is_active() {
            session.stream = Some(handle);
        } else {
            // Closed, failed or reopened while the transport was starting.
            drop(session);
            handle.cancel();
        }
    }

    fn request(&self, session: &Session) -> StreamRequest {
        let mut headers = self.headers.clone();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        // Last-Event-ID for resumption.
        if let Some(id) = &session.last_event_id
            && let Ok(value) = HeaderValue::from_str(id)
        {
            headers.insert(HeaderName::from_static("last-event-id"), value);
        }

        StreamRequest {
            url: self.url.clone(),
            headers,
        }
    }

    fn close(&self) {
        let stream = {
            let mut session = self.session.lock();
            if session.state.is_closed() {
                return;
            }

            session.reconnector.cancel();
            session.parser.reset();
            self.set_state(&mut session, ConnectionState::Closed);
            info!(url = %self.url, "SSE connection closing (requested)");
            self.dispatcher.emit(
                EventKind::Close,
                Event::lifecycle(ConnectionState::Closed),
            );
            session.stream.take()
        };

        if let Some(stream) = stream {
            stream.cancel();
        }
    }

    fn shutdown(&self) {
        let stream = {
            let mut session = self.session.lock();
            session.reconnector.cancel();
            session.stream.take()
        };
        drop(stream);
    }

    fn handle_chunk(&self, generation: u64, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        let mut session = self.session.lock();
        if session.generation != generation || !session.state.is_active() {
            trace!(generation, "Ignoring chunk from stale SSE stream");
            return;
        }

        if session.state == ConnectionState::Connecting {
            session.reconnector.cancel();
            self.set_state(&mut session, ConnectionState::Open);
            info!(url = %self.url, generation, "SSE connection established");
            self.dispatcher
                .emit(EventKind::Open, Event::lifecycle(ConnectionState::Open));
        }

        if let Err(err) = session.parser.feed(chunk) {
            warn!(
                error = %err,
                len = chunk.len(),
                buffered = session.parser.buffered(),
                "Dropping undecodable SSE chunk"
            );
            return;
        }

        while let Some(block) = session.parser.next_block() {
            if let Some(retry) = block.retry {
                debug!(retry_ms = retry.as_millis() as u64, "SSE retry interval updated");
                session.retry_interval = retry;
            }
            if let Some(id) = &block.id {
                session.last_event_id = Some(id.to_string());
            }
            if block.is_empty() {
                trace!("SSE block without fields");
            }

            let event = Event {
                ready_state: ConnectionState::Open,
                id: block.id,
                name: block.name,
                data: block.data,
                error: None,
            };
            debug!(
                event_type = %event.event_type(),
                id = ?event.id(),
                "SSE event received",
            );
            self.dispatcher.emit(EventKind::Message, event);
        }
    }

    fn handle_failure(self: &Arc<Self>, generation: u64, error: TransportError) {
        let stream = {
            let mut session = self.session.lock();
            if session.generation != generation || !session.state.is_active() {
                debug!(generation, error = %error, "Ignoring failure of inactive SSE stream");
                return;
            }

            self.set_state(&mut session, ConnectionState::Error);
            warn!(url = %self.url, error = %error, "SSE stream failed");
            self.dispatcher.emit(EventKind::Error, Event::failure(error));
            self.schedule_retry(&mut session);
            session.stream.take()
        };
        drop(stream);
    }

    fn schedule_retry(self: &Arc<Self>, session: &mut Session) {
        let delay = session.retry_interval;
        let weak = Arc::downgrade(self);
        let scheduled = session
            .reconnector
            .schedule(&self.runtime, delay, move |timer| {
                if let Some(inner) = weak.upgrade() {
                    inner.retry_fired(timer);
                }
            });

        if let Some(timer) = scheduled {
            info!(
                timer,
                delay_ms = delay.as_millis() as u64,
                "SSE reconnecting after retry interval"
            );
        }
    }

    fn retry_fired(self: &Arc<Self>, timer: u64) {
        let pending = {
            let mut session = self.session.lock();
            if !session.reconnector.claim(timer) {
                debug!(timer, "Ignoring cancelled SSE retry");
                return;
            }
            self.begin_open(&mut session)
        };
        if let Some(pending) = pending {
            self.start_stream(pending);
        }
    }

    fn set_state(&self, session: &mut Session, state: ConnectionState) {
        trace!(from = %session.state, to = %state, "SSE state transition");
        session.state = state;
        self.state_tx.send_replace(state);
    }
}

// ---------------------------------------------------------------------------
// Internal: transport callbacks
// ---------------------------------------------------------------------------

/// Routes one stream's callbacks back into the session.
struct SessionSink {
    inner: Weak<Inner>,
    generation: u64,
}

impl StreamSink for SessionSink {
    fn on_chunk(&self, chunk: Bytes) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_chunk(self.generation, &chunk);
        }
    }

    fn on_complete(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_failure(self.generation, TransportError::StreamEnded);
        }
    }

    fn on_error(&self, error: Option<TransportError>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_failure(self.generation, TransportError::or_unknown(error));
        }
    }
}
