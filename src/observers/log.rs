//! # Built-in event logger (demo/reference).
//!
//! [`EventLog`] writes every gate event through `tracing`. Useful as a
//! starting point for custom observers and for seeing a gate work in
//! development; production deployments typically bridge events to their own
//! monitoring surface instead.

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::{Observe, ObserverError};

/// Observer that logs every event via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventLog;

impl EventLog {
    /// Creates the logger.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for EventLog {
    async fn on_event(&self, event: &Event) -> Result<(), ObserverError> {
        let command = event
            .command
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        match event.kind {
            EventKind::CommandAdded | EventKind::CommandSent => {
                tracing::info!(
                    seq = event.seq,
                    kind = event.kind.as_str(),
                    queue = %event.queue,
                    command = %command,
                    "gate event"
                );
            }
            EventKind::CommandRejected => {
                tracing::warn!(
                    seq = event.seq,
                    kind = event.kind.as_str(),
                    queue = %event.queue,
                    command = %command,
                    reason = event.reason.as_deref().unwrap_or("-"),
                    "gate event"
                );
            }
            EventKind::QueueStateChanged => {
                tracing::info!(
                    seq = event.seq,
                    kind = event.kind.as_str(),
                    queue = %event.queue,
                    state = event.state.map(|s| s.as_str()).unwrap_or("-"),
                    "gate event"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "event_log"
    }
}
