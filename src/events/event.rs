//! # Events emitted by the admission gate.
//!
//! The [`EventKind`] enum classifies the four observable transitions of a
//! command-queue system:
//! - a command was admitted to a queue,
//! - a command was released downstream,
//! - a command was rejected,
//! - a queue changed state.
//!
//! The [`Event`] struct carries the metadata observers need: timestamps, the
//! queue involved, the command id and name where applicable, rejection
//! reasons, and the new queue state.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically in emission order. Observers run on their own workers and
//! may observe events late; use `seq` to restore emission order.
//!
//! ## Example
//! ```rust
//! use uplinkgate::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::CommandRejected, "ops")
//!     .with_reason("Transmission constraints check failed");
//!
//! assert_eq!(ev.kind, EventKind::CommandRejected);
//! assert_eq!(ev.queue.as_ref(), "ops");
//! assert_eq!(ev.reason.as_deref(), Some("Transmission constraints check failed"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::commands::{Command, CommandId};
use crate::gate::{ConstraintStatus, QueueState};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of gate events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A command was admitted to a queue.
    ///
    /// Sets: `queue`, `command`, `command_name`.
    CommandAdded,

    /// A command was released to the uplink transport.
    ///
    /// Sets: `queue`, `command`, `command_name`.
    CommandSent,

    /// A command was rejected.
    ///
    /// Sets: `queue`, `command`, `command_name`, `reason`.
    CommandRejected,

    /// A queue transitioned to a new state (operator action or expiration),
    /// or an armed state-expiration timer was reset.
    ///
    /// Sets: `queue`, `state`.
    QueueStateChanged,
}

impl EventKind {
    /// Short stable label (snake_case) for logs/metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CommandAdded => "command_added",
            EventKind::CommandSent => "command_sent",
            EventKind::CommandRejected => "command_rejected",
            EventKind::QueueStateChanged => "queue_state_changed",
        }
    }
}

/// Gate event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the queue involved.
    pub queue: Arc<str>,
    /// Id of the command, if the event concerns one.
    pub command: Option<CommandId>,
    /// Name of the command, if the event concerns one.
    pub command_name: Option<Arc<str>>,
    /// Human-readable reason (rejections).
    pub reason: Option<Arc<str>>,
    /// New queue state (state changes).
    pub state: Option<QueueState>,
    /// Aggregate constraint status at the time of the event, if the command
    /// was being gated on constraints.
    pub constraint_status: Option<ConstraintStatus>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn new(kind: EventKind, queue: impl Into<Arc<str>>) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            queue: queue.into(),
            command: None,
            command_name: None,
            reason: None,
            state: None,
            constraint_status: None,
        }
    }

    /// Attaches the command's id and name.
    #[inline]
    #[must_use]
    pub fn with_command(mut self, command: &Command) -> Self {
        self.command = Some(command.id());
        self.command_name = Some(command.name_arc());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the queue's new state.
    #[inline]
    #[must_use]
    pub fn with_state(mut self, state: QueueState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches the aggregate constraint status.
    #[inline]
    #[must_use]
    pub fn with_constraint_status(mut self, status: ConstraintStatus) -> Self {
        self.constraint_status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers_increase() {
        let a = Event::new(EventKind::CommandAdded, "default");
        let b = Event::new(EventKind::CommandSent, "default");
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builders_attach_metadata() {
        let cmd = Command::new("/test/noop");
        let ev = Event::new(EventKind::CommandRejected, "ops")
            .with_command(&cmd)
            .with_reason("Rejected by operator1");

        assert_eq!(ev.command, Some(cmd.id()));
        assert_eq!(ev.command_name.as_deref(), Some("/test/noop"));
        assert_eq!(ev.reason.as_deref(), Some("Rejected by operator1"));
        assert!(ev.state.is_none());
    }
}
