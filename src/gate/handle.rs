//! # GateHandle: the request surface of a running gate.
//!
//! A [`GateHandle`] is a cheap clone-able sender. Every call posts one
//! operation to the worker and, where the contract returns a value,
//! awaits a oneshot reply. Handles are what an operator transport (REST,
//! RPC, a WebSocket bridge) holds on to; the worker itself is never touched
//! directly.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::commands::{Command, CommandId};
use crate::error::GateError;
use crate::observers::Observe;
use crate::telemetry::ParameterValue;

use super::manager::Op;
use super::queue::{QueueInfo, QueueState};

/// Outcome of a submission: the command's id and the queue it was routed
/// to, returned regardless of whether the command was released, rejected,
/// or parked.
#[derive(Clone, Debug)]
pub struct SubmitReceipt {
    /// The submitted command's id.
    pub id: CommandId,
    /// Name of the queue the command was routed to.
    pub queue: Arc<str>,
}

/// Clone-able handle to a running [`AdmissionGate`](crate::AdmissionGate).
#[derive(Clone)]
pub struct GateHandle {
    tx: mpsc::Sender<Op>,
}

impl GateHandle {
    pub(crate) fn new(tx: mpsc::Sender<Op>) -> Self {
        Self { tx }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Op) -> Result<T, GateError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(make(tx)).await.map_err(|_| GateError::Closed)?;
        rx.await.map_err(|_| GateError::Closed)
    }

    /// Submits a command on behalf of `user`.
    ///
    /// The receipt names the queue the command was routed to; the outcome
    /// (released, rejected, parked) is reported through events and history.
    pub async fn submit(
        &self,
        user: impl Into<String>,
        command: Command,
    ) -> Result<SubmitReceipt, GateError> {
        let user = user.into();
        self.request(|reply| Op::Submit {
            user,
            command,
            reply,
        })
        .await
    }

    /// Sets a queue's state, returning the queue's post-transition snapshot.
    ///
    /// Re-selecting the current state while an expiration timer is armed
    /// resets the timer and touches no commands.
    pub async fn set_queue_state(
        &self,
        name: impl Into<String>,
        state: QueueState,
    ) -> Result<QueueInfo, GateError> {
        let name = name.into();
        self.request(|reply| Op::SetQueueState { name, state, reply })
            .await?
    }

    /// Releases a pending command immediately, bypassing constraint
    /// re-evaluation. `Ok(None)` if no queue holds the command.
    pub async fn release_command(
        &self,
        id: CommandId,
        user: impl Into<String>,
    ) -> Result<Option<CommandId>, GateError> {
        let user = user.into();
        self.request(|reply| Op::Release { id, user, reply }).await
    }

    /// Rejects a pending command ("Rejected by `user`"). `Ok(None)` if no
    /// queue holds the command.
    pub async fn reject_command(
        &self,
        id: CommandId,
        user: impl Into<String>,
    ) -> Result<Option<CommandId>, GateError> {
        let user = user.into();
        self.request(|reply| Op::Reject { id, user, reply }).await
    }

    /// Feeds a telemetry batch into the gate. Most recent value wins; every
    /// active constraint watcher re-checks immediately.
    pub async fn update_parameters(&self, batch: Vec<ParameterValue>) -> Result<(), GateError> {
        self.tx
            .send(Op::UpdateParameters { batch })
            .await
            .map_err(|_| GateError::Closed)
    }

    /// Snapshots of all queues, in configuration order.
    pub async fn queues(&self) -> Result<Vec<QueueInfo>, GateError> {
        self.request(|reply| Op::Queues { reply }).await
    }

    /// Snapshot of one queue, or `None` if the name is unknown.
    pub async fn queue(&self, name: impl Into<String>) -> Result<Option<QueueInfo>, GateError> {
        let name = name.into();
        self.request(|reply| Op::Queue { name, reply }).await
    }

    /// Registers an observer for the live event feed.
    pub async fn register_observer(&self, observer: Arc<dyn Observe>) -> Result<(), GateError> {
        self.tx
            .send(Op::RegisterObserver { observer })
            .await
            .map_err(|_| GateError::Closed)
    }

    /// Unregisters an observer by name. `Ok(false)` if none matched.
    pub async fn unregister_observer(
        &self,
        name: impl Into<String>,
    ) -> Result<bool, GateError> {
        let name = name.into();
        self.request(|reply| Op::UnregisterObserver { name, reply })
            .await
    }

    /// Resets a queue's sent/rejected counters. `Ok(false)` if the queue
    /// name is unknown.
    pub async fn reset_counters(&self, name: impl Into<String>) -> Result<bool, GateError> {
        let name = name.into();
        self.request(|reply| Op::ResetCounters { name, reply }).await
    }
}
