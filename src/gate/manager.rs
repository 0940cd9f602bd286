//! # AdmissionGate: the single-writer admission worker.
//!
//! [`AdmissionGate`] owns every piece of mutable gate state (queue
//! membership, queue states, active constraint watchers, the parameter
//! snapshot, the observer set) and mutates it from exactly one task.
//! Everything that wants to touch that state (a submission, a telemetry
//! batch, an operator action, a timer firing) is an operation posted to the
//! worker's channel and executed strictly in post order.
//!
//! ## Architecture
//! ```text
//!  submit / set_state / release / reject          telemetry feed
//!        (GateHandle, oneshot replies)                 │
//!                  │                                   │
//!                  ▼                                   ▼
//!          ┌───────────────────── op channel ──────────────────────┐
//!          │                 AdmissionGate::run()                  │
//!          │   queues ─ watchers ─ snapshot ─ observers ─ timers   │
//!          └──┬───────────────┬────────────────────────────┬───────┘
//!             │               │                            │
//!             ▼               ▼                            ▼
//!        Releaser        HistorySink                  ObserverSet
//!      (uplink path)   (fire-and-forget)         (bounded fan-out)
//!
//!  timers are sleep-tasks that post ops back:
//!    queue-state expiration ──► Op::ExpireState { queue, generation }
//!    watcher re-check tick ───► Op::CheckWatcher { id }
//! ```
//!
//! ## Rules
//! - No two ops run concurrently; there is no locking anywhere in the core.
//! - A command's disposition transfers exactly once: removal from `pending`
//!   is the first step of any terminal transition.
//! - Timer ops are cheap to waste: a re-check on a resolved watcher and a
//!   stale expiration generation are both no-ops.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::commands::{Command, CommandId};
use crate::config::{GateConfig, DEFAULT_QUEUE};
use crate::error::GateError;
use crate::events::{Event, EventKind};
use crate::history::{HistoryKey, HistoryRecord, HistorySink};
use crate::observers::{Observe, ObserverSet};
use crate::privileges::PrivilegeResolver;
use crate::release::Releaser;
use crate::telemetry::{ParameterSnapshot, ParameterValue};

use super::handle::SubmitReceipt;
use super::queue::{CommandQueue, ExpirationTimer, QueueInfo, QueueState};
use super::watcher::{CheckOutcome, ConstraintStatus, ConstraintWatcher};

/// One unit of work on the gate worker's timeline.
pub(crate) enum Op {
    Submit {
        user: String,
        command: Command,
        reply: oneshot::Sender<SubmitReceipt>,
    },
    SetQueueState {
        name: String,
        state: QueueState,
        reply: oneshot::Sender<Result<QueueInfo, GateError>>,
    },
    Release {
        id: CommandId,
        user: String,
        reply: oneshot::Sender<Option<CommandId>>,
    },
    Reject {
        id: CommandId,
        user: String,
        reply: oneshot::Sender<Option<CommandId>>,
    },
    UpdateParameters {
        batch: Vec<ParameterValue>,
    },
    CheckWatcher {
        id: CommandId,
    },
    ExpireState {
        name: String,
        generation: u64,
    },
    Queues {
        reply: oneshot::Sender<Vec<QueueInfo>>,
    },
    Queue {
        name: String,
        reply: oneshot::Sender<Option<QueueInfo>>,
    },
    RegisterObserver {
        observer: Arc<dyn Observe>,
    },
    UnregisterObserver {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    ResetCounters {
        name: String,
        reply: oneshot::Sender<bool>,
    },
}

/// The admission worker. Construct with [`AdmissionGate::builder`], then
/// spawn [`AdmissionGate::run`] and talk to it through the
/// [`GateHandle`](crate::GateHandle).
pub struct AdmissionGate {
    pub(crate) queues: Vec<CommandQueue>,
    pub(crate) watchers: HashMap<CommandId, ConstraintWatcher>,
    pub(crate) snapshot: ParameterSnapshot,
    pub(crate) observers: ObserverSet,
    pub(crate) initial_observers: Vec<Arc<dyn Observe>>,
    pub(crate) releaser: Arc<dyn Releaser>,
    pub(crate) history: Arc<dyn HistorySink>,
    pub(crate) privileges: Arc<dyn PrivilegeResolver>,
    pub(crate) tx: mpsc::Sender<Op>,
    pub(crate) rx: mpsc::Receiver<Op>,
}

impl AdmissionGate {
    /// Starts building a gate from a queue configuration and the uplink
    /// hand-off.
    pub fn builder(config: GateConfig, releaser: Arc<dyn Releaser>) -> super::GateBuilder {
        super::GateBuilder::new(config, releaser)
    }

    /// Runs the worker until `shutdown` is cancelled.
    ///
    /// Commands still pending at shutdown are left undisposed; queues are
    /// rebuilt from configuration on the next start.
    pub async fn run(mut self, shutdown: CancellationToken) {
        for observer in std::mem::take(&mut self.initial_observers) {
            self.observers.register(observer);
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                op = self.rx.recv() => match op {
                    Some(op) => self.handle_op(op),
                    None => break,
                },
            }
        }

        for ix in 0..self.queues.len() {
            self.cancel_expiration(ix);
        }
    }

    fn handle_op(&mut self, op: Op) {
        match op {
            Op::Submit {
                user,
                command,
                reply,
            } => {
                let receipt = self.submit(&user, command);
                let _ = reply.send(receipt);
            }
            Op::SetQueueState { name, state, reply } => {
                let _ = reply.send(self.set_queue_state(&name, state));
            }
            Op::Release { id, user, reply } => {
                let _ = reply.send(self.release_command(id, &user));
            }
            Op::Reject { id, user, reply } => {
                let _ = reply.send(self.reject_command(id, &user));
            }
            Op::UpdateParameters { batch } => self.update_parameters(batch),
            Op::CheckWatcher { id } => self.check_watcher(id),
            Op::ExpireState { name, generation } => self.expire_state(&name, generation),
            Op::Queues { reply } => {
                let infos = (0..self.queues.len()).map(|ix| self.queue_info(ix)).collect();
                let _ = reply.send(infos);
            }
            Op::Queue { name, reply } => {
                let _ = reply.send(self.queue_index(&name).map(|ix| self.queue_info(ix)));
            }
            Op::RegisterObserver { observer } => self.observers.register(observer),
            Op::UnregisterObserver { name, reply } => {
                let _ = reply.send(self.observers.unregister(&name));
            }
            Op::ResetCounters { name, reply } => {
                let found = self.queue_index(&name);
                if let Some(ix) = found {
                    self.queues[ix].reset_counters();
                }
                let _ = reply.send(found.is_some());
            }
        }
    }

    // ---------------------------
    // Submission and routing
    // ---------------------------

    /// Admits one command: routes it, notifies the addition, then acts on
    /// the target queue's current state.
    fn submit(&mut self, user: &str, command: Command) -> SubmitReceipt {
        let command = if command.origin().is_empty() {
            command.with_origin(user)
        } else {
            command
        };

        let ix = self.route(user, &command);
        let queue_name = self.queues[ix].name_arc();
        let id = command.id();

        self.history.publish(HistoryRecord::Added {
            id,
            name: command.name_arc(),
            origin: Arc::from(command.origin()),
            queue: Arc::clone(&queue_name),
        });

        let added = Event::new(EventKind::CommandAdded, Arc::clone(&queue_name)).with_command(&command);
        self.queues[ix].push(command);
        self.observers.emit(&added);

        match self.queues[ix].state() {
            QueueState::Disabled => {
                if let Some(command) = self.queues[ix].remove(&id) {
                    self.fail_command(ix, command, "Commanding Queue disabled", None);
                }
            }
            QueueState::Blocked => {}
            QueueState::Enabled => self.dispatch(ix, id),
        }

        SubmitReceipt {
            id,
            queue: queue_name,
        }
    }

    /// Dispatches one pending command of an enabled queue: starts a
    /// constraint watcher, or releases immediately if nothing gates it.
    fn dispatch(&mut self, ix: usize, id: CommandId) {
        let Some(command) = self.queues[ix].get(&id).cloned() else {
            return;
        };
        if command.has_constraints() {
            self.start_watcher(ix, command);
        } else {
            self.history.publish(HistoryRecord::Attribute {
                id,
                key: HistoryKey::TransmissionConstraints,
                value: Arc::from("NA"),
            });
            if let Some(command) = self.queues[ix].remove(&id) {
                self.release_now(ix, command, None);
            }
        }
    }

    /// First queue, in the submitter's privilege order, whose significance
    /// filter accepts the command; `default` if none match.
    fn route(&self, user: &str, command: &Command) -> usize {
        for name in self.privileges.insert_queues(user) {
            if let Some(ix) = self.queue_index(&name) {
                if self.queues[ix].accepts(command.significance()) {
                    return ix;
                }
            }
        }
        self.queue_index(DEFAULT_QUEUE).unwrap_or_else(|| {
            // Guaranteed by construction; see GateBuilder::build.
            debug_assert!(false, "default queue missing");
            0
        })
    }

    fn queue_index(&self, name: &str) -> Option<usize> {
        self.queues.iter().position(|q| q.name() == name)
    }

    // ---------------------------
    // Queue state transitions
    // ---------------------------

    fn set_queue_state(
        &mut self,
        name: &str,
        state: QueueState,
    ) -> Result<QueueInfo, GateError> {
        let Some(ix) = self.queue_index(name) else {
            return Err(GateError::QueueNotFound {
                name: name.to_string(),
            });
        };
        self.apply_queue_state(ix, state);
        Ok(self.queue_info(ix))
    }

    fn apply_queue_state(&mut self, ix: usize, state: QueueState) {
        let queue = &self.queues[ix];
        if queue.state() == state {
            // Re-selecting the current override only extends its lifetime;
            // queued commands are not touched.
            if state != queue.default_state()
                && queue.expiration_armed()
                && queue.state_expiration().is_some()
            {
                tracing::debug!(queue = queue.name(), "same state selected, resetting expiration");
                self.arm_expiration(ix);
                let queue = &self.queues[ix];
                self.observers.emit(
                    &Event::new(EventKind::QueueStateChanged, queue.name_arc()).with_state(state),
                );
            }
            return;
        }

        self.cancel_expiration(ix);
        self.queues[ix].set_state(state);
        tracing::info!(queue = self.queues[ix].name(), state = %state, "queue state changed");

        match state {
            QueueState::Enabled => {
                for id in self.queues[ix].pending_ids() {
                    if self.watchers.contains_key(&id) {
                        // A watcher survived an intervening BLOCKED phase;
                        // its next check resolves the command normally.
                        continue;
                    }
                    self.dispatch(ix, id);
                }
            }
            QueueState::Disabled => {
                let drained = self.queues[ix].take_pending();
                for command in drained {
                    self.watchers.remove(&command.id());
                    self.fail_command(ix, command, "Queue disabled", None);
                }
            }
            QueueState::Blocked => {}
        }

        if self.queues[ix].state_expiration().is_some()
            && state != self.queues[ix].default_state()
        {
            self.arm_expiration(ix);
        }

        let queue = &self.queues[ix];
        self.observers
            .emit(&Event::new(EventKind::QueueStateChanged, queue.name_arc()).with_state(state));
    }

    /// Arms (or re-arms) the one-shot revert timer of a queue.
    fn arm_expiration(&mut self, ix: usize) {
        let Some(duration) = self.queues[ix].state_expiration() else {
            return;
        };
        self.cancel_expiration(ix);

        let generation = self.queues[ix].next_expiration_generation();
        let deadline = Instant::now() + duration;
        let token = CancellationToken::new();
        let name = self.queues[ix].name().to_string();
        let tx = self.tx.clone();
        let timer_token = token.clone();
        tracing::info!(queue = %name, seconds = duration.as_secs(), "scheduling state expiration");
        tokio::spawn(async move {
            tokio::select! {
                _ = timer_token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = tx.send(Op::ExpireState { name, generation }).await;
                }
            }
        });

        self.queues[ix].arm_expiration(ExpirationTimer {
            token,
            deadline,
            generation,
        });
    }

    fn cancel_expiration(&mut self, ix: usize) {
        if let Some(timer) = self.queues[ix].disarm_expiration() {
            timer.token.cancel();
        }
    }

    /// Revert-timer firing. Stale generations (the timer was superseded
    /// while its op was in flight) are ignored.
    fn expire_state(&mut self, name: &str, generation: u64) {
        let Some(ix) = self.queue_index(name) else {
            return;
        };
        if !self.queues[ix].expiration_matches(generation) {
            return;
        }
        self.cancel_expiration(ix);
        let default_state = self.queues[ix].default_state();
        tracing::info!(queue = name, state = %default_state, "queue state override expired, reverting");
        self.apply_queue_state(ix, default_state);
    }

    // ---------------------------
    // Manual release / reject
    // ---------------------------

    /// Operator-initiated release: bypasses constraint re-evaluation.
    fn release_command(&mut self, id: CommandId, user: &str) -> Option<CommandId> {
        let (ix, command) = self.find_and_remove(&id)?;
        self.watchers.remove(&id);
        tracing::info!(command = %id, user, queue = self.queues[ix].name(), "command released by operator");
        self.release_now(ix, command, None);
        Some(id)
    }

    /// Operator-initiated rejection.
    fn reject_command(&mut self, id: CommandId, user: &str) -> Option<CommandId> {
        let (ix, command) = self.find_and_remove(&id)?;
        self.watchers.remove(&id);
        let reason = format!("Rejected by {user}");
        self.fail_command(ix, command, &reason, None);
        Some(id)
    }

    fn find_and_remove(&mut self, id: &CommandId) -> Option<(usize, Command)> {
        for ix in 0..self.queues.len() {
            if let Some(command) = self.queues[ix].remove(id) {
                return Some((ix, command));
            }
        }
        tracing::warn!(command = %id, "command not found in any queue");
        None
    }

    // ---------------------------
    // Telemetry and watchers
    // ---------------------------

    /// Merges a telemetry batch and opportunistically re-checks every active
    /// watcher: satisfaction may arrive well before the next scheduled tick.
    fn update_parameters(&mut self, batch: Vec<ParameterValue>) {
        self.snapshot.merge(batch);
        let ids: Vec<CommandId> = self.watchers.keys().copied().collect();
        for id in ids {
            self.check_watcher(id);
        }
    }

    fn start_watcher(&mut self, ix: usize, command: Command) {
        let id = command.id();
        if self.watchers.contains_key(&id) {
            return;
        }
        let watcher = ConstraintWatcher::new(self.queues[ix].name_arc(), command);
        self.watchers.insert(id, watcher);
        self.check_watcher(id);
    }

    /// Runs one evaluation pass for a watcher. A no-op if the watcher has
    /// already resolved (redundant ticks are expected and harmless).
    fn check_watcher(&mut self, id: CommandId) {
        let Some(watcher) = self.watchers.get_mut(&id) else {
            return;
        };
        match watcher.check(Instant::now(), &self.snapshot) {
            CheckOutcome::Pending { next_check } => {
                self.history.publish(HistoryRecord::Attribute {
                    id,
                    key: HistoryKey::TransmissionConstraints,
                    value: Arc::from("PENDING"),
                });
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(next_check).await;
                    let _ = tx.send(Op::CheckWatcher { id }).await;
                });
            }
            CheckOutcome::Satisfied => self.finish_watcher(id, ConstraintStatus::Ok),
            CheckOutcome::TimedOut => self.finish_watcher(id, ConstraintStatus::TimedOut),
        }
    }

    /// Terminal watcher handling. The queue's state at this instant decides
    /// what the verdict means:
    /// - `Blocked`: the command stays pending and the watcher is discarded;
    ///   a fresh watcher starts if the queue is re-enabled.
    /// - `Disabled`: the command is rejected regardless of the verdict.
    /// - `Enabled`: the verdict applies — release on `Ok`, reject on
    ///   `TimedOut`.
    fn finish_watcher(&mut self, id: CommandId, status: ConstraintStatus) {
        let Some(watcher) = self.watchers.remove(&id) else {
            return;
        };
        let Some(ix) = self.queue_index(watcher.queue()) else {
            return;
        };
        tracing::info!(
            command = %id,
            queue = watcher.queue(),
            status = ?status,
            "transmission constraint check finished"
        );

        match self.queues[ix].state() {
            QueueState::Blocked => {
                tracing::debug!(command = %id, "queue blocked, leaving command pending");
                return;
            }
            QueueState::Disabled => {
                if let Some(command) = self.queues[ix].remove(&id) {
                    self.fail_command(ix, command, "Queue disabled", None);
                }
                return;
            }
            QueueState::Enabled => {}
        }

        let Some(command) = self.queues[ix].remove(&id) else {
            // Removed in the meanwhile (manual release/reject).
            return;
        };
        match status {
            ConstraintStatus::Ok => {
                self.history.publish(HistoryRecord::Attribute {
                    id,
                    key: HistoryKey::TransmissionConstraints,
                    value: Arc::from("OK"),
                });
                self.release_now(ix, command, Some(ConstraintStatus::Ok));
            }
            ConstraintStatus::TimedOut => {
                self.history.publish(HistoryRecord::Attribute {
                    id,
                    key: HistoryKey::TransmissionConstraints,
                    value: Arc::from("NOK"),
                });
                self.fail_command(
                    ix,
                    command,
                    "Transmission constraints check failed",
                    Some(ConstraintStatus::TimedOut),
                );
            }
            ConstraintStatus::Pending => {
                debug_assert!(false, "finish_watcher called with a pending status");
            }
        }
    }

    // ---------------------------
    // Terminal transitions
    // ---------------------------

    /// Hands a command to the uplink transport and notifies observers.
    /// The command must already be removed from its queue.
    fn release_now(&mut self, ix: usize, command: Command, status: Option<ConstraintStatus>) {
        self.queues[ix].mark_sent();
        let mut event =
            Event::new(EventKind::CommandSent, self.queues[ix].name_arc()).with_command(&command);
        if let Some(status) = status {
            event = event.with_constraint_status(status);
        }
        self.releaser.release(command);
        self.observers.emit(&event);
    }

    /// Records a rejection and notifies observers. The command must already
    /// be removed from its queue.
    fn fail_command(
        &mut self,
        ix: usize,
        command: Command,
        reason: &str,
        status: Option<ConstraintStatus>,
    ) {
        let id = command.id();
        self.history.publish(HistoryRecord::Attribute {
            id,
            key: HistoryKey::CommandFailed,
            value: Arc::from(reason),
        });
        self.history.publish(HistoryRecord::Attribute {
            id,
            key: HistoryKey::CommandComplete,
            value: Arc::from("NOK"),
        });
        self.queues[ix].mark_rejected();
        tracing::info!(command = %id, queue = self.queues[ix].name(), reason, "command rejected");

        let mut event = Event::new(EventKind::CommandRejected, self.queues[ix].name_arc())
            .with_command(&command)
            .with_reason(reason);
        if let Some(status) = status {
            event = event.with_constraint_status(status);
        }
        self.observers.emit(&event);
    }

    fn queue_info(&self, ix: usize) -> QueueInfo {
        self.queues[ix].info(|id| self.watchers.get(id).map(|w| w.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CompareOp, ParameterCompare, Predicate, Significance};
    use crate::commands::{PredicateError, TransmissionConstraint};
    use crate::config::QueueConfig;
    use crate::observers::ObserverError;
    use crate::privileges::StaticPrivileges;
    use crate::release::ChannelReleaser;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    struct Recorder {
        tx: mpsc::UnboundedSender<Event>,
    }

    #[async_trait]
    impl Observe for Recorder {
        async fn on_event(&self, event: &Event) -> Result<(), ObserverError> {
            let _ = self.tx.send(event.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Counting {
        evaluations: Arc<AtomicUsize>,
        met: bool,
    }

    impl Predicate for Counting {
        fn is_met(&self, _snapshot: &ParameterSnapshot) -> Result<bool, PredicateError> {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            Ok(self.met)
        }
    }

    struct TestGate {
        handle: crate::GateHandle,
        uplink: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedReceiver<Event>,
        _shutdown: CancellationToken,
    }

    impl TestGate {
        /// Next event of the given kind; panics if none arrives in time.
        async fn expect_event(&mut self, kind: EventKind) -> Event {
            let deadline = Duration::from_secs(120);
            timeout(deadline, async {
                loop {
                    let ev = self.events.recv().await.expect("event stream closed");
                    if ev.kind == kind {
                        return ev;
                    }
                }
            })
            .await
            .unwrap_or_else(|_| panic!("no {} event arrived", kind.as_str()))
        }

        /// Asserts no event of the given kind arrives within `window`.
        async fn expect_no_event(&mut self, kind: EventKind, window: Duration) {
            let result = timeout(window, async {
                loop {
                    let ev = self.events.recv().await.expect("event stream closed");
                    if ev.kind == kind {
                        return ev;
                    }
                }
            })
            .await;
            assert!(
                result.is_err(),
                "unexpected {} event within {:?}",
                kind.as_str(),
                window
            );
        }

        async fn expect_released(&mut self) -> Command {
            timeout(Duration::from_secs(120), self.uplink.recv())
                .await
                .expect("no command reached the uplink")
                .expect("uplink channel closed")
        }
    }

    async fn spawn_gate(config: GateConfig, privileges: StaticPrivileges) -> TestGate {
        let (releaser, uplink) = ChannelReleaser::new();
        let (ev_tx, events) = mpsc::unbounded_channel();
        let (gate, handle) = AdmissionGate::builder(config, Arc::new(releaser))
            .with_privileges(Arc::new(privileges))
            .with_observer(Arc::new(Recorder { tx: ev_tx }))
            .build()
            .expect("valid test configuration");
        let shutdown = CancellationToken::new();
        tokio::spawn(gate.run(shutdown.clone()));
        TestGate {
            handle,
            uplink,
            events,
            _shutdown: shutdown,
        }
    }

    fn enabled_default() -> GateConfig {
        GateConfig::new().with_queue(QueueConfig::new("default", QueueState::Enabled))
    }

    fn never_met(timeout_ms: u64) -> TransmissionConstraint {
        TransmissionConstraint::new(
            Arc::new(ParameterCompare::new("bus_voltage", CompareOp::Ge, 1_000_000)),
            Duration::from_millis(timeout_ms),
        )
    }

    fn voltage_at_least(threshold: i64, timeout_ms: u64) -> TransmissionConstraint {
        TransmissionConstraint::new(
            Arc::new(ParameterCompare::new("bus_voltage", CompareOp::Ge, threshold)),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_enabled_queue_releases_unconstrained_command_immediately() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        let cmd = Command::new("/bus/noop");
        let id = cmd.id();
        let receipt = gate.handle.submit("operator1", cmd).await.unwrap();
        assert_eq!(receipt.queue.as_ref(), "default");

        assert_eq!(gate.expect_released().await.id(), id);
        gate.expect_event(EventKind::CommandAdded).await;
        let sent = gate.expect_event(EventKind::CommandSent).await;
        assert_eq!(sent.command, Some(id));

        let info = gate.handle.queue("default").await.unwrap().unwrap();
        assert_eq!(info.sent_count, 1);
        assert!(info.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_queue_holds_until_enabled() {
        let config = GateConfig::new().with_queue(QueueConfig::new("q1", QueueState::Blocked));
        let mut gate = spawn_gate(config, StaticPrivileges::everyone(["q1"])).await;

        let cmd = Command::new("/bus/noop");
        let id = cmd.id();
        let receipt = gate.handle.submit("operator1", cmd).await.unwrap();
        assert_eq!(receipt.queue.as_ref(), "q1");

        gate.expect_no_event(EventKind::CommandSent, Duration::from_secs(2)).await;
        let info = gate.handle.queue("q1").await.unwrap().unwrap();
        assert_eq!(info.pending.len(), 1);

        gate.handle
            .set_queue_state("q1", QueueState::Enabled)
            .await
            .unwrap();
        assert_eq!(gate.expect_released().await.id(), id);

        let info = gate.handle.queue("q1").await.unwrap().unwrap();
        assert!(info.pending.is_empty());
        assert_eq!(info.sent_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_queue_rejects_before_any_constraint_evaluation() {
        let config = GateConfig::new().with_queue(QueueConfig::new("default", QueueState::Disabled));
        let mut gate = spawn_gate(config, StaticPrivileges::default()).await;

        let evaluations = Arc::new(AtomicUsize::new(0));
        let cmd = Command::new("/bus/noop").with_constraint(TransmissionConstraint::new(
            Arc::new(Counting {
                evaluations: Arc::clone(&evaluations),
                met: true,
            }),
            Duration::from_secs(10),
        ));
        gate.handle.submit("operator1", cmd).await.unwrap();

        let rejected = gate.expect_event(EventKind::CommandRejected).await;
        assert_eq!(rejected.reason.as_deref(), Some("Commanding Queue disabled"));
        assert_eq!(evaluations.load(Ordering::SeqCst), 0);

        let info = gate.handle.queue("default").await.unwrap().unwrap();
        assert_eq!(info.rejected_count, 1);
        assert!(info.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_follows_privilege_order_and_significance_filters() {
        let config = GateConfig::new()
            .with_queue(
                QueueConfig::new("vip", QueueState::Blocked)
                    .with_significances([Significance::Critical, Significance::Severe]),
            )
            .with_queue(QueueConfig::new("ops", QueueState::Blocked));
        let privileges = StaticPrivileges::everyone(["ops"])
            .grant("flight_director", ["vip", "ops"])
            .grant("viewer", Vec::<String>::new());
        let gate = spawn_gate(config, privileges).await;

        // Repeated submissions route identically.
        for _ in 0..3 {
            let critical = Command::new("/eps/reset").with_significance(Significance::Critical);
            let receipt = gate.handle.submit("flight_director", critical).await.unwrap();
            assert_eq!(receipt.queue.as_ref(), "vip");
        }

        // The first privileged queue's filter rejects an unclassified
        // command; scanning continues to the next privileged queue.
        let routine = Command::new("/bus/noop");
        let receipt = gate.handle.submit("flight_director", routine).await.unwrap();
        assert_eq!(receipt.queue.as_ref(), "ops");

        let critical = Command::new("/eps/reset").with_significance(Significance::Critical);
        let receipt = gate.handle.submit("operator1", critical).await.unwrap();
        assert_eq!(receipt.queue.as_ref(), "ops");

        // No privilege matches at all: the command lands in `default`.
        let receipt = gate
            .handle
            .submit("viewer", Command::new("/bus/noop"))
            .await
            .unwrap();
        assert_eq!(receipt.queue.as_ref(), "default");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_constraint_times_out_on_first_check() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        let cmd = Command::new("/bus/noop").with_constraint(never_met(0));
        gate.handle.submit("operator1", cmd).await.unwrap();

        let rejected = gate.expect_event(EventKind::CommandRejected).await;
        assert_eq!(
            rejected.reason.as_deref(),
            Some("Transmission constraints check failed")
        );
        assert_eq!(rejected.constraint_status, Some(ConstraintStatus::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_constraint_satisfied_by_telemetry_releases_before_deadline() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        let cmd = Command::new("/bus/heater_on").with_constraint(voltage_at_least(24, 2000));
        let id = cmd.id();
        let start = Instant::now();
        gate.handle.submit("operator1", cmd).await.unwrap();

        // Pending: the watcher is waiting on telemetry.
        let info = gate.handle.queue("default").await.unwrap().unwrap();
        assert_eq!(info.pending[0].constraint_status, Some(ConstraintStatus::Pending));

        tokio::time::sleep(Duration::from_millis(500)).await;
        gate.handle
            .update_parameters(vec![ParameterValue::new("bus_voltage", 28)])
            .await
            .unwrap();

        assert_eq!(gate.expect_released().await.id(), id);
        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_millis(2000),
            "released at {elapsed:?}, after the deadline"
        );
        let sent = gate.expect_event(EventKind::CommandSent).await;
        assert_eq!(sent.constraint_status, Some(ConstraintStatus::Ok));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsatisfied_constraint_rejects_at_its_deadline() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        let cmd = Command::new("/bus/noop").with_constraint(never_met(100));
        let start = Instant::now();
        gate.handle.submit("operator1", cmd).await.unwrap();

        let rejected = gate.expect_event(EventKind::CommandRejected).await;
        assert_eq!(
            rejected.reason.as_deref(),
            Some("Transmission constraints check failed")
        );
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(500),
            "rejected at {elapsed:?}, expected ~100ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_override_expires_back_to_default() {
        let config = GateConfig::new().with_queue(
            QueueConfig::new("ops", QueueState::Enabled)
                .with_state_expiration(Duration::from_secs(5)),
        );
        let mut gate = spawn_gate(config, StaticPrivileges::everyone(["ops"])).await;

        let start = Instant::now();
        gate.handle
            .set_queue_state("ops", QueueState::Blocked)
            .await
            .unwrap();
        let changed = gate.expect_event(EventKind::QueueStateChanged).await;
        assert_eq!(changed.state, Some(QueueState::Blocked));

        let info = gate.handle.queue("ops").await.unwrap().unwrap();
        assert!(info.state_expiration_remaining_s >= 0);

        // No operator action: the override expires on its own.
        let reverted = gate.expect_event(EventKind::QueueStateChanged).await;
        assert_eq!(reverted.state, Some(QueueState::Enabled));
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6),
            "reverted at {elapsed:?}, expected ~5s"
        );

        let info = gate.handle.queue("ops").await.unwrap().unwrap();
        assert_eq!(info.state, QueueState::Enabled);
        assert_eq!(info.state_expiration_remaining_s, -1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_state_reselection_resets_expiration_and_keeps_commands() {
        let config = GateConfig::new().with_queue(
            QueueConfig::new("ops", QueueState::Enabled)
                .with_state_expiration(Duration::from_secs(5)),
        );
        let mut gate = spawn_gate(config, StaticPrivileges::everyone(["ops"])).await;

        let start = Instant::now();
        gate.handle
            .set_queue_state("ops", QueueState::Blocked)
            .await
            .unwrap();
        gate.expect_event(EventKind::QueueStateChanged).await;

        gate.handle
            .submit("operator1", Command::new("/bus/noop"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        gate.handle
            .set_queue_state("ops", QueueState::Blocked)
            .await
            .unwrap();
        gate.expect_event(EventKind::QueueStateChanged).await;

        // Still parked: re-selection touched the timer, not the commands.
        let info = gate.handle.queue("ops").await.unwrap().unwrap();
        assert_eq!(info.pending.len(), 1);
        assert_eq!(info.rejected_count, 0);

        // The revert lands ~5s after the *second* selection, not the first.
        let reverted = gate.expect_event(EventKind::QueueStateChanged).await;
        assert_eq!(reverted.state, Some(QueueState::Enabled));
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(8),
            "reverted at {elapsed:?}, expected ~8s"
        );

        // Re-enabling drained the queue.
        gate.expect_released().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_release_bypasses_constraints_and_tolerates_stale_checks() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        let cmd = Command::new("/bus/noop").with_constraint(never_met(10_000));
        let id = cmd.id();
        gate.handle.submit("operator1", cmd).await.unwrap();

        let released = gate.handle.release_command(id, "operator1").await.unwrap();
        assert_eq!(released, Some(id));
        assert_eq!(gate.expect_released().await.id(), id);

        // The scheduled deadline check finds nothing to do: exactly one
        // disposition, no late rejection.
        tokio::time::sleep(Duration::from_secs(11)).await;
        gate.expect_no_event(EventKind::CommandRejected, Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reject_names_the_operator() {
        let mut gate = spawn_gate(
            GateConfig::new().with_queue(QueueConfig::new("default", QueueState::Blocked)),
            StaticPrivileges::default(),
        )
        .await;

        let cmd = Command::new("/bus/noop");
        let id = cmd.id();
        gate.handle.submit("operator1", cmd).await.unwrap();

        let rejected = gate.handle.reject_command(id, "flight_director").await.unwrap();
        assert_eq!(rejected, Some(id));
        let ev = gate.expect_event(EventKind::CommandRejected).await;
        assert_eq!(ev.reason.as_deref(), Some("Rejected by flight_director"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_ids_and_queue_names_touch_nothing() {
        let gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        let missing = gate
            .handle
            .release_command(CommandId::new(), "operator1")
            .await
            .unwrap();
        assert_eq!(missing, None);

        let err = gate
            .handle
            .set_queue_state("nonexistent", QueueState::Enabled)
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "queue_not_found");

        assert_eq!(gate.handle.queue("nonexistent").await.unwrap().map(|q| q.name), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_verdict_is_suppressed_while_queue_is_blocked() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        let cmd = Command::new("/bus/noop").with_constraint(never_met(1000));
        gate.handle.submit("operator1", cmd).await.unwrap();

        gate.handle
            .set_queue_state("default", QueueState::Blocked)
            .await
            .unwrap();

        // The watcher times out while the queue is blocked: the command
        // stays pending and no rejection is reported.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let info = gate.handle.queue("default").await.unwrap().unwrap();
        assert_eq!(info.pending.len(), 1);
        assert_eq!(info.rejected_count, 0);

        // Re-enabling starts a fresh watcher with a fresh budget, which
        // then times out for real.
        let start = Instant::now();
        gate.handle
            .set_queue_state("default", QueueState::Enabled)
            .await
            .unwrap();
        let rejected = gate.expect_event(EventKind::CommandRejected).await;
        assert_eq!(
            rejected.reason.as_deref(),
            Some("Transmission constraints check failed")
        );
        assert!(start.elapsed() >= Duration::from_millis(1000));

        let info = gate.handle.queue("default").await.unwrap().unwrap();
        assert!(info.pending.is_empty());
        assert_eq!(info.rejected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_discards_active_watchers_and_rejects() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        let cmd = Command::new("/bus/noop").with_constraint(never_met(10_000));
        gate.handle.submit("operator1", cmd).await.unwrap();

        gate.handle
            .set_queue_state("default", QueueState::Disabled)
            .await
            .unwrap();
        let rejected = gate.expect_event(EventKind::CommandRejected).await;
        assert_eq!(rejected.reason.as_deref(), Some("Queue disabled"));

        // Nothing further once the original deadline passes.
        tokio::time::sleep(Duration::from_secs(11)).await;
        gate.expect_no_event(EventKind::CommandRejected, Duration::from_secs(1)).await;
        gate.expect_no_event(EventKind::CommandSent, Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_command_gets_exactly_one_disposition() {
        let config = GateConfig::new().with_queue(QueueConfig::new("ops", QueueState::Enabled));
        let mut gate = spawn_gate(config, StaticPrivileges::everyone(["ops"])).await;

        // Interleave submissions with queue-state churn. Commands carry a
        // mix of no constraints, instantly-failing constraints, and 50ms
        // budgets that can never be met.
        let states = [
            QueueState::Blocked,
            QueueState::Enabled,
            QueueState::Disabled,
            QueueState::Enabled,
            QueueState::Blocked,
            QueueState::Enabled,
        ];
        let mut submitted = Vec::new();
        for (i, state) in states.iter().enumerate() {
            for j in 0..2 {
                let mut cmd = Command::new(format!("/churn/{i}/{j}"));
                match j {
                    0 => {}
                    _ => cmd = cmd.with_constraint(never_met(50)),
                }
                submitted.push(cmd.id());
                gate.handle.submit("operator1", cmd).await.unwrap();
            }
            gate.handle.set_queue_state("ops", *state).await.unwrap();
        }
        gate.handle
            .set_queue_state("ops", QueueState::Enabled)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut disposed = std::collections::HashSet::new();
        for _ in 0..submitted.len() {
            let ev = timeout(Duration::from_secs(60), async {
                loop {
                    let ev = gate.events.recv().await.expect("event stream closed");
                    if matches!(ev.kind, EventKind::CommandSent | EventKind::CommandRejected) {
                        return ev;
                    }
                }
            })
            .await
            .expect("missing a terminal disposition");
            let id = ev.command.expect("terminal event without a command id");
            assert!(disposed.insert(id), "command {id} disposed twice");
        }
        assert_eq!(disposed.len(), submitted.len());
        for id in submitted {
            assert!(disposed.contains(&id));
        }

        // And nothing is disposed a second time afterwards.
        gate.expect_no_event(EventKind::CommandSent, Duration::from_secs(2)).await;
        gate.expect_no_event(EventKind::CommandRejected, Duration::from_secs(2)).await;

        let info = gate.handle.queue("ops").await.unwrap().unwrap();
        assert!(info.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_reset_is_an_explicit_admin_action() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        gate.handle
            .submit("operator1", Command::new("/bus/noop"))
            .await
            .unwrap();
        gate.expect_released().await;

        let info = gate.handle.queue("default").await.unwrap().unwrap();
        assert_eq!(info.sent_count, 1);

        assert!(gate.handle.reset_counters("default").await.unwrap());
        let info = gate.handle.queue("default").await.unwrap().unwrap();
        assert_eq!(info.sent_count, 0);

        assert!(!gate.handle.reset_counters("nonexistent").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_listing_preserves_configuration_order() {
        let config = GateConfig::new()
            .with_queue(QueueConfig::new("vip", QueueState::Enabled))
            .with_queue(QueueConfig::new("ops", QueueState::Blocked));
        let gate = spawn_gate(config, StaticPrivileges::default()).await;

        let names: Vec<String> = gate
            .handle
            .queues()
            .await
            .unwrap()
            .iter()
            .map(|q| q.name.to_string())
            .collect();
        assert_eq!(names, vec!["vip", "ops", "default"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_can_be_registered_and_unregistered_at_runtime() {
        let mut gate = spawn_gate(enabled_default(), StaticPrivileges::default()).await;

        struct Second {
            tx: mpsc::UnboundedSender<u64>,
        }

        #[async_trait]
        impl Observe for Second {
            async fn on_event(&self, event: &Event) -> Result<(), ObserverError> {
                let _ = self.tx.send(event.seq);
                Ok(())
            }

            fn name(&self) -> &'static str {
                "second"
            }
        }

        let (tx, mut seqs) = mpsc::unbounded_channel();
        gate.handle
            .register_observer(Arc::new(Second { tx }))
            .await
            .unwrap();

        gate.handle
            .submit("operator1", Command::new("/bus/noop"))
            .await
            .unwrap();

        // Both the initial and the late observer see the events.
        let added = gate.expect_event(EventKind::CommandAdded).await;
        assert_eq!(seqs.recv().await, Some(added.seq));

        assert!(gate.handle.unregister_observer("second").await.unwrap());
        assert!(!gate.handle.unregister_observer("second").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_records_cover_every_command_state_change() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct RecordingHistory {
            records: Mutex<Vec<HistoryRecord>>,
        }

        impl HistorySink for RecordingHistory {
            fn publish(&self, record: HistoryRecord) {
                self.records.lock().unwrap().push(record);
            }
        }

        let history = Arc::new(RecordingHistory::default());
        let (releaser, mut uplink) = ChannelReleaser::new();
        let (gate, handle) = AdmissionGate::builder(enabled_default(), Arc::new(releaser))
            .with_history(Arc::clone(&history) as Arc<dyn HistorySink>)
            .build()
            .expect("valid test configuration");
        let shutdown = CancellationToken::new();
        tokio::spawn(gate.run(shutdown.clone()));

        // Unconstrained release: Added, then TransmissionConstraints = NA.
        let cmd = Command::new("/bus/noop");
        let released_id = cmd.id();
        handle.submit("operator1", cmd).await.unwrap();
        uplink.recv().await.unwrap();

        // Constraint timeout: Added, PENDING, then NOK + failure records.
        let cmd = Command::new("/bus/gated").with_constraint(never_met(50));
        let failed_id = cmd.id();
        handle.submit("operator1", cmd).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let records = history.records.lock().unwrap();
        let attrs: Vec<(CommandId, HistoryKey, String)> = records
            .iter()
            .filter_map(|r| match r {
                HistoryRecord::Attribute { id, key, value } => {
                    Some((*id, *key, value.to_string()))
                }
                HistoryRecord::Added { .. } => None,
            })
            .collect();

        assert!(matches!(&records[0],
            HistoryRecord::Added { id, origin, queue, .. }
                if *id == released_id && origin.as_ref() == "operator1" && queue.as_ref() == "default"));
        assert!(attrs.contains(&(
            released_id,
            HistoryKey::TransmissionConstraints,
            "NA".to_string()
        )));
        assert!(attrs.contains(&(
            failed_id,
            HistoryKey::TransmissionConstraints,
            "PENDING".to_string()
        )));
        assert!(attrs.contains(&(
            failed_id,
            HistoryKey::TransmissionConstraints,
            "NOK".to_string()
        )));
        assert!(attrs.contains(&(
            failed_id,
            HistoryKey::CommandFailed,
            "Transmission constraints check failed".to_string()
        )));
        assert!(attrs.contains(&(failed_id, HistoryKey::CommandComplete, "NOK".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_queue_config_fails_the_build() {
        let config = GateConfig::new()
            .with_queue(QueueConfig::new("ops", QueueState::Enabled))
            .with_queue(QueueConfig::new("ops", QueueState::Blocked));
        let (releaser, _uplink) = ChannelReleaser::new();
        let err = AdmissionGate::builder(config, Arc::new(releaser))
            .build()
            .err()
            .expect("duplicate queue names must fail validation");
        assert_eq!(err.as_label(), "config_duplicate_queue");
    }
}
