//! Observer registry and event dispatch.
//!
//! Events are queued by the connection and delivered by a single background
//! task, so observers never run on the transport's read path and always run
//! one at a time, in emission order.

use std::{
    collections::HashMap,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{error, trace};

use crate::event::{Event, EventKind};

/// Observer callback.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Registered observers of one event source.
///
/// Lifecycle observers (open, message, close, error) occupy a single slot
/// each and are replaced on registration. Named observers accumulate per
/// event name in registration order.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    on_open: Option<EventHandler>,
    on_message: Option<EventHandler>,
    on_close: Option<EventHandler>,
    on_error: Option<EventHandler>,
    named: HashMap<String, Vec<EventHandler>>,
}

impl HandlerRegistry {
    /// Replace the single observer for `kind`.
    pub fn set(&mut self, kind: EventKind, handler: EventHandler) {
        let slot = match kind {
            EventKind::Open => &mut self.on_open,
            EventKind::Message => &mut self.on_message,
            EventKind::Close => &mut self.on_close,
            EventKind::Error => &mut self.on_error,
        };
        *slot = Some(handler);
    }

    /// Append an observer for events whose `event` field equals `name`.
    pub fn add(&mut self, name: impl Into<String>, handler: EventHandler) {
        self.named.entry(name.into()).or_default().push(handler);
    }

    /// Number of named observers registered for `name`.
    pub fn named_count(&self, name: &str) -> usize {
        self.named.get(name).map_or(0, Vec::len)
    }

    /// Observers to invoke for `event`, in invocation order.
    ///
    /// Message events go to the catch-all message observer first, then to
    /// every observer registered under the event's name.
    pub fn targets(&self, kind: EventKind, event: &Event) -> Vec<EventHandler> {
        let single = match kind {
            EventKind::Open => &self.on_open,
            EventKind::Message => &self.on_message,
            EventKind::Close => &self.on_close,
            EventKind::Error => &self.on_error,
        };

        let mut targets: Vec<EventHandler> = single.iter().cloned().collect();
        if kind == EventKind::Message
            && let Some(named) = event.name().and_then(|name| self.named.get(name))
        {
            targets.extend(named.iter().cloned());
        }
        targets
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Queue in front of the dispatch task.
///
/// The task exits once the dispatcher is dropped and the queue drains. A
/// panicking observer is logged and skipped.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    registry: Arc<Mutex<HandlerRegistry>>,
    tx: mpsc::UnboundedSender<(EventKind, Event)>,
}

impl Dispatcher {
    /// Spawn the dispatch task on `runtime`.
    pub(crate) fn spawn(runtime: &Handle) -> Self {
        let registry = Arc::new(Mutex::new(HandlerRegistry::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        runtime.spawn(dispatch_loop(Arc::clone(&registry), rx));

        Self { registry, tx }
    }

    /// Mutate the registry.
    pub(crate) fn register(&self, f: impl FnOnce(&mut HandlerRegistry)) {
        f(&mut self.registry.lock());
    }

    /// Queue `event` for delivery. Never blocks.
    pub(crate) fn emit(&self, kind: EventKind, event: Event) {
        if self.tx.send((kind, event)).is_err() {
            trace!(%kind, "Dispatch task gone, dropping event");
        }
    }
}

async fn dispatch_loop(
    registry: Arc<Mutex<HandlerRegistry>>,
    mut rx: mpsc::UnboundedReceiver<(EventKind, Event)>,
) {
    while let Some((kind, event)) = rx.recv().await {
        // Snapshot so observers can register more observers.
        let targets = registry.lock().targets(kind, &event);
        trace!(%kind, observers = targets.len(), "Dispatching event");
        for handler in targets {
            // Observer panics are logged and skipped.
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(%kind, event_type = %event.event_type(), "SSE observer panicked");
            }
        }
    }
}
