//! # Command history sink.
//!
//! Every state change of a command produces one [`HistoryRecord`]: admission
//! to a queue, the progress of its transmission-constraint check, failure
//! reasons. The sink is fire-and-forget: `publish` must never block the gate
//! worker (implementations queue internally and do their I/O elsewhere).

use std::sync::Arc;

use crate::commands::CommandId;

/// Well-known history attribute keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryKey {
    /// Progress of the transmission-constraint check:
    /// `NA` (no constraints), `PENDING`, `OK`, or `NOK`.
    TransmissionConstraints,
    /// Human-readable failure reason of a rejected command.
    CommandFailed,
    /// Terminal acknowledgement status (the gate only writes `NOK`;
    /// post-release verification owns the positive case).
    CommandComplete,
}

impl HistoryKey {
    /// The attribute key string as written to the history store.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKey::TransmissionConstraints => "TransmissionConstraints",
            HistoryKey::CommandFailed => "CommandFailed",
            HistoryKey::CommandComplete => "CommandComplete",
        }
    }
}

/// One command-history record.
#[derive(Clone, Debug)]
pub enum HistoryRecord {
    /// A command entered the system and was routed to a queue.
    Added {
        /// The command's id.
        id: CommandId,
        /// Fully qualified command name.
        name: Arc<str>,
        /// Submitting identity.
        origin: Arc<str>,
        /// Queue the command was routed to.
        queue: Arc<str>,
    },
    /// An attribute of the command changed.
    Attribute {
        /// The command's id.
        id: CommandId,
        /// Which attribute.
        key: HistoryKey,
        /// The new value.
        value: Arc<str>,
    },
}

/// Fire-and-forget history publisher.
///
/// Called from the gate worker's timeline; must not block.
pub trait HistorySink: Send + Sync {
    /// Publishes one record.
    fn publish(&self, record: HistoryRecord);
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistory;

impl HistorySink for NoopHistory {
    fn publish(&self, _record: HistoryRecord) {}
}
