//! Reconnection scheduling.
//!
//! At most one retry timer is armed at a time. A timer is identified by a
//! sequence number so a firing timer can tell whether it was cancelled or
//! superseded while it waited for the session lock.

use std::time::Duration;

use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;

/// Owned handle to one scheduled retry.
#[derive(Debug)]
struct RetryTimer {
    id: u64,
    task: JoinHandle<()>,
}

/// Owns the single pending retry timer of a connection.
#[derive(Debug, Default)]
pub(crate) struct Reconnector {
    pending: Option<RetryTimer>,
    next_id: u64,
}

impl Reconnector {
    /// Returns `true` if a retry is armed.
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Arm a one-shot timer calling `on_fire` with the timer id after
    /// `delay`, unless a timer is already pending.
    ///
    /// Returns the id of the new timer, or `None` if one was already armed.
    pub(crate) fn schedule<F>(&mut self, runtime: &Handle, delay: Duration, on_fire: F) -> Option<u64>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if self.pending.is_some() {
            debug!("Retry already pending, not rescheduling");
            return None;
        }

        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(id);
        });

        self.pending = Some(RetryTimer { id, task });
        Some(id)
    }

    /// Cancel the pending timer, if any. Returns `true` if one was armed.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(timer) => {
                timer.task.abort();
                debug!(timer = timer.id, "Retry cancelled");
                true
            }
            None => false,
        }
    }

    /// Claim the timer `id` from its own task.
    ///
    /// Returns `false` if the timer was cancelled or replaced in the meantime,
    /// in which case the firing must be ignored.
    pub(crate) fn claim(&mut self, id: u64) -> bool {
        if self.pending.as_ref().is_some_and(|timer| timer.id == id) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.task.abort();
        }
    }
}
