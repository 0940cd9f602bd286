//! # Core observer trait
//!
//! `Observe` is the extension point for plugging monitoring clients into the
//! gate: operator UIs, audit bridges, metrics exporters. Each observer is
//! driven by a dedicated worker loop fed by a bounded queue owned by the
//! [`ObserverSet`](crate::ObserverSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching) — they do **not** block the
//!   gate worker nor other observers.
//! - Each observer **declares** its preferred queue capacity via
//!   [`Observe::queue_capacity`]. If a queue overflows, events for that
//!   observer are **dropped** (warn).
//! - An observer that returns an error (or panics) is logged and
//!   **unregistered**: its worker exits and it receives no further events. A
//!   misbehaving observer never stalls command processing.

use async_trait::async_trait;
use thiserror::Error;

use crate::events::Event;

/// Error returned by an observer callback.
///
/// Any error unregisters the observer; recovery is the observer's own
/// business (re-register through the gate handle).
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ObserverError {
    message: String,
}

impl ObserverError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Contract for gate event observers.
///
/// Called from an observer-dedicated worker task. Implementations should
/// avoid blocking the async runtime (prefer async I/O and cooperative waits).
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handles a single event.
    ///
    /// Returning an error unregisters this observer.
    async fn on_event(&self, event: &Event) -> Result<(), ObserverError>;

    /// Human-readable name (for logs and for `unregister`).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this observer's queue.
    ///
    /// On overflow, events for this observer are **dropped** (warn).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
