//! # Release transport seam.
//!
//! [`Releaser`] hands a command to the physical uplink path. From the gate's
//! perspective the hand-off is instantaneous: implementations queue
//! internally and never block the worker.

use tokio::sync::mpsc;

use crate::commands::Command;

/// Downstream hand-off for released commands.
pub trait Releaser: Send + Sync {
    /// Takes ownership of a command cleared for uplink. Must not block.
    fn release(&self, command: Command);
}

/// Releaser that forwards commands into an unbounded channel.
///
/// The uplink side drains the receiver at its own pace. Doubles as the
/// standard test transport.
pub struct ChannelReleaser {
    tx: mpsc::UnboundedSender<Command>,
}

impl ChannelReleaser {
    /// Creates the releaser and the receiving end of the uplink channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Releaser for ChannelReleaser {
    fn release(&self, command: Command) {
        if let Err(err) = self.tx.send(command) {
            tracing::warn!(command = %err.0.id(), "uplink receiver dropped, command discarded");
        }
    }
}
