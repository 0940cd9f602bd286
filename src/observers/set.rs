//! # ObserverSet: non-blocking fan-out over multiple observers
//!
//! [`ObserverSet`] distributes each [`Event`] to multiple observers
//! **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-observer FIFO (queue order).
//! - Errors and panics inside observers are caught and logged, and the
//!   offending observer is removed from the set (isolation: one bad
//!   monitoring client never stalls the gate).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different observers (use [`Event::seq`]).
//! - No retries on per-observer queue overflow (events are dropped for that
//!   observer).
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per observer)
//!        ├────────────────► [queue O1] ─► worker O1 ─► on_event()
//!        ├────────────────► [queue O2] ─► worker O2 ─► on_event()
//!        └────────────────► [queue ON] ─► worker ON ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::events::Event;

use super::Observe;

/// Per-observer channel with metadata.
struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Composite fan-out with per-observer bounded queues and worker tasks.
///
/// Owned by the gate worker; registration and emission both happen on its
/// timeline, so the set needs no locking.
#[derive(Default)]
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
}

impl ObserverSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer and spawns its worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&mut self, observer: Arc<dyn Observe>) {
        let cap = observer.queue_capacity().max(1);
        let name = observer.name();
        let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);

        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                let fut = observer.on_event(ev.as_ref());
                match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(observer = name, error = %err, "observer failed, unregistering");
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(observer = name, "observer panicked, unregistering");
                        break;
                    }
                }
            }
            // Exiting drops `rx`; the sender turns up closed and `emit`
            // prunes the channel.
        });

        self.channels.push(ObserverChannel { name, sender: tx });
    }

    /// Unregisters the observer with the given name.
    ///
    /// Returns false if no observer by that name is registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|ch| ch.name != name);
        self.channels.len() < before
    }

    /// Fans out one event to all observers (non-blocking).
    ///
    /// If an observer's queue is **full**, the event is dropped for it. An
    /// observer whose worker has exited (error or panic) is pruned here.
    pub fn emit(&mut self, event: &Event) {
        let ev = Arc::new(event.clone());
        self.channels.retain(|ch| match ch.sender.try_send(Arc::clone(&ev)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(observer = ch.name, "observer queue full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(observer = ch.name, "observer worker gone, removing");
                false
            }
        });
    }

    /// True if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}
