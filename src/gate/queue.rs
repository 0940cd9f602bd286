//! # Command queues.
//!
//! A [`CommandQueue`] is a named holding area for admitted-but-not-yet
//! released commands, with an admission state, the default state a temporary
//! override reverts to, an optional override expiration, and an optional
//! significance allow-list.
//!
//! ## Rules
//! - Insertion order is release priority.
//! - `remove` of an absent command returns `None`; callers tolerate an
//!   earlier removal (a manual release can race a scheduled constraint
//!   check on the op queue).
//! - No internal locking: all mutation happens on the gate worker's
//!   timeline.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::commands::{Command, CommandId, Significance};
use crate::config::QueueConfig;
use crate::error::ConfigError;

use super::watcher::ConstraintStatus;

/// Admission state of a queue.
///
/// - `Enabled`: commands are dispatched (constraint-gated or released).
/// - `Disabled`: commands are rejected on arrival.
/// - `Blocked`: commands are held until an operator changes the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    /// Commands pass through (subject to transmission constraints).
    Enabled,
    /// Commands are rejected immediately.
    Disabled,
    /// Commands wait in the queue.
    Blocked,
}

impl QueueState {
    /// The lowercase label used in configuration and on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Enabled => "enabled",
            QueueState::Disabled => "disabled",
            QueueState::Blocked => "blocked",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueState {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("enabled") {
            Ok(QueueState::Enabled)
        } else if s.eq_ignore_ascii_case("disabled") {
            Ok(QueueState::Disabled)
        } else if s.eq_ignore_ascii_case("blocked") {
            Ok(QueueState::Blocked)
        } else {
            Err(ConfigError::InvalidState {
                value: s.to_string(),
            })
        }
    }
}

/// An armed state-expiration timer.
///
/// Cancelling the token stops the sleeping timer task; the generation guards
/// against a revert op that was already posted when the timer was cancelled.
pub(crate) struct ExpirationTimer {
    pub(crate) token: CancellationToken,
    pub(crate) deadline: Instant,
    pub(crate) generation: u64,
}

/// A named command queue.
pub(crate) struct CommandQueue {
    name: Arc<str>,
    state: QueueState,
    default_state: QueueState,
    state_expiration: Option<Duration>,
    significances: Option<Vec<Significance>>,
    pending: VecDeque<Command>,
    sent_count: u64,
    rejected_count: u64,
    expiration: Option<ExpirationTimer>,
    expiration_generation: u64,
}

impl CommandQueue {
    /// Builds a queue from its configuration entry.
    pub(crate) fn from_config(cfg: &QueueConfig) -> Self {
        Self::new(cfg.name(), cfg.state())
            .with_state_expiration(cfg.state_expiration())
            .with_significances(cfg.significances().map(<[Significance]>::to_vec))
    }

    pub(crate) fn new(name: impl Into<Arc<str>>, state: QueueState) -> Self {
        Self {
            name: name.into(),
            state,
            default_state: state,
            state_expiration: None,
            significances: None,
            pending: VecDeque::new(),
            sent_count: 0,
            rejected_count: 0,
            expiration: None,
            expiration_generation: 0,
        }
    }

    fn with_state_expiration(mut self, expiration: Option<Duration>) -> Self {
        self.state_expiration = expiration;
        self
    }

    fn with_significances(mut self, significances: Option<Vec<Significance>>) -> Self {
        self.significances = significances;
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn state(&self) -> QueueState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: QueueState) {
        self.state = state;
    }

    pub(crate) fn default_state(&self) -> QueueState {
        self.default_state
    }

    pub(crate) fn state_expiration(&self) -> Option<Duration> {
        self.state_expiration
    }

    /// True if the significance filter admits a command of this level.
    ///
    /// No filter admits everything; a command without an assigned
    /// significance matches through the literal `none` label.
    pub(crate) fn accepts(&self, significance: Significance) -> bool {
        match &self.significances {
            None => true,
            Some(filter) => filter.contains(&significance),
        }
    }

    pub(crate) fn push(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Removes a pending command by id. `None` if it is no longer pending.
    pub(crate) fn remove(&mut self, id: &CommandId) -> Option<Command> {
        let ix = self.pending.iter().position(|c| c.id() == *id)?;
        self.pending.remove(ix)
    }

    pub(crate) fn get(&self, id: &CommandId) -> Option<&Command> {
        self.pending.iter().find(|c| c.id() == *id)
    }

    pub(crate) fn pending_ids(&self) -> Vec<CommandId> {
        self.pending.iter().map(Command::id).collect()
    }

    /// Drains the whole pending list (DISABLED transition).
    pub(crate) fn take_pending(&mut self) -> VecDeque<Command> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent_count += 1;
    }

    pub(crate) fn mark_rejected(&mut self) {
        self.rejected_count += 1;
    }

    pub(crate) fn sent_count(&self) -> u64 {
        self.sent_count
    }

    pub(crate) fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    /// Explicit admin action; the counters are otherwise monotonic.
    pub(crate) fn reset_counters(&mut self) {
        self.sent_count = 0;
        self.rejected_count = 0;
    }

    /// Hands out the next timer generation. Bumped on every arm so a revert
    /// op from a superseded timer is recognizably stale.
    pub(crate) fn next_expiration_generation(&mut self) -> u64 {
        self.expiration_generation += 1;
        self.expiration_generation
    }

    pub(crate) fn arm_expiration(&mut self, timer: ExpirationTimer) {
        self.expiration = Some(timer);
    }

    pub(crate) fn disarm_expiration(&mut self) -> Option<ExpirationTimer> {
        self.expiration.take()
    }

    pub(crate) fn expiration_armed(&self) -> bool {
        self.expiration.is_some()
    }

    pub(crate) fn expiration_matches(&self, generation: u64) -> bool {
        self.expiration
            .as_ref()
            .is_some_and(|t| t.generation == generation)
    }

    /// Whole seconds until the armed override expires; `-1` if none is armed.
    pub(crate) fn state_expiration_remaining_s(&self) -> i64 {
        match &self.expiration {
            None => -1,
            Some(timer) => timer
                .deadline
                .saturating_duration_since(Instant::now())
                .as_secs() as i64,
        }
    }

    /// Serializable snapshot for the operator surface. `constraint_status`
    /// looks up the aggregate verdict of a command's active watcher.
    pub(crate) fn info<F>(&self, constraint_status: F) -> QueueInfo
    where
        F: Fn(&CommandId) -> Option<ConstraintStatus>,
    {
        QueueInfo {
            name: self.name_arc(),
            state: self.state,
            default_state: self.default_state,
            state_expiration_remaining_s: self.state_expiration_remaining_s(),
            sent_count: self.sent_count,
            rejected_count: self.rejected_count,
            pending: self
                .pending
                .iter()
                .map(|c| PendingCommand {
                    id: c.id(),
                    name: c.name_arc(),
                    significance: c.significance(),
                    constraint_status: constraint_status(&c.id()),
                })
                .collect(),
        }
    }
}

/// Snapshot of one queue, as exposed to operators.
#[derive(Clone, Debug, Serialize)]
pub struct QueueInfo {
    /// Queue name.
    pub name: Arc<str>,
    /// Current admission state.
    pub state: QueueState,
    /// State a temporary override reverts to.
    pub default_state: QueueState,
    /// Whole seconds until an armed override expires; `-1` if none is armed.
    pub state_expiration_remaining_s: i64,
    /// Commands released from this queue since startup (or counter reset).
    pub sent_count: u64,
    /// Commands rejected from this queue since startup (or counter reset).
    pub rejected_count: u64,
    /// Pending commands, in release-priority order.
    pub pending: Vec<PendingCommand>,
}

/// One pending entry of a [`QueueInfo`] snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct PendingCommand {
    /// The command's id.
    pub id: CommandId,
    /// Fully qualified command name.
    pub name: Arc<str>,
    /// The command's significance level.
    pub significance: Significance,
    /// Aggregate constraint verdict, if the command is being gated.
    pub constraint_status: Option<ConstraintStatus>,
}
