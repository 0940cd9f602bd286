//! # Transmission-constraint watcher.
//!
//! One [`ConstraintWatcher`] per command with constraints. Each constraint
//! gets an explicit state-table entry (`Pending | Ok | TimedOut`) plus an
//! absolute deadline stamped on the first check; the aggregate verdict is a
//! pure function over the table.
//!
//! ## State machine
//! ```text
//! created ──► first check stamps deadlines, all constraints Pending
//!
//! check(now):
//!   per still-Pending constraint, in order:
//!     now past deadline ──────────────► TimedOut   (short-circuit the pass)
//!     predicate error ───► not met this round (logged, never fatal)
//!     predicate true ────► Ok (latched; not re-evaluated)
//!     predicate false, no budget left ► TimedOut   (short-circuit the pass)
//!     predicate false, budget left ───► stays Pending
//!
//!   aggregate: Ok iff all Ok; TimedOut iff any TimedOut; else Pending
//!   Pending ──► re-check at min(remaining deadlines), or sooner when new
//!               telemetry arrives
//! ```
//!
//! A zero timeout therefore means "must hold on the very first check";
//! the deadline stamping on first check guarantees the constraint is
//! evaluated once before the budget is declared spent.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::commands::{Command, TransmissionConstraint};
use crate::telemetry::ParameterSnapshot;

/// Status of a single constraint, and the aggregate verdict across all
/// constraints of one command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintStatus {
    /// Not yet satisfied; budget remains.
    Pending,
    /// Satisfied (latched).
    Ok,
    /// Budget spent without the predicate holding.
    TimedOut,
}

/// State-table entry for one constraint.
struct ConstraintCheck {
    constraint: TransmissionConstraint,
    status: ConstraintStatus,
    deadline: Instant,
}

/// Aggregate verdict across per-constraint statuses.
///
/// `Ok` iff all `Ok`; `TimedOut` iff any `TimedOut`; otherwise `Pending`.
pub(crate) fn aggregate(statuses: impl IntoIterator<Item = ConstraintStatus>) -> ConstraintStatus {
    let mut verdict = ConstraintStatus::Ok;
    for status in statuses {
        match status {
            ConstraintStatus::TimedOut => return ConstraintStatus::TimedOut,
            ConstraintStatus::Pending => verdict = ConstraintStatus::Pending,
            ConstraintStatus::Ok => {}
        }
    }
    verdict
}

/// Outcome of one watcher pass.
pub(crate) enum CheckOutcome {
    /// All constraints satisfied; release the command.
    Satisfied,
    /// At least one constraint timed out; reject the command.
    TimedOut,
    /// Still pending; re-check after `next_check` unless telemetry triggers
    /// an earlier pass.
    Pending {
        next_check: Duration,
    },
}

/// Per-command constraint evaluation state machine.
pub(crate) struct ConstraintWatcher {
    command: Command,
    queue: Arc<str>,
    checks: Vec<ConstraintCheck>,
    started: bool,
}

impl ConstraintWatcher {
    pub(crate) fn new(queue: Arc<str>, command: Command) -> Self {
        let checks = command
            .constraints()
            .iter()
            .map(|constraint| ConstraintCheck {
                constraint: constraint.clone(),
                status: ConstraintStatus::Pending,
                // Placeholder; real deadlines are stamped on the first check.
                deadline: Instant::now(),
            })
            .collect();
        Self {
            command,
            queue,
            checks,
            started: false,
        }
    }

    pub(crate) fn queue(&self) -> &str {
        &self.queue
    }

    /// Current aggregate verdict (for operator snapshots).
    pub(crate) fn status(&self) -> ConstraintStatus {
        aggregate(self.checks.iter().map(|c| c.status))
    }

    /// Runs one evaluation pass.
    pub(crate) fn check(&mut self, now: Instant, snapshot: &ParameterSnapshot) -> CheckOutcome {
        if !self.started {
            for check in &mut self.checks {
                check.deadline = now + check.constraint.timeout();
            }
            self.started = true;
        }

        let mut next_check = Duration::MAX;
        for check in &mut self.checks {
            if check.status != ConstraintStatus::Pending {
                continue;
            }

            if now > check.deadline {
                check.status = ConstraintStatus::TimedOut;
                return CheckOutcome::TimedOut;
            }
            let remaining = check.deadline - now;

            let met = match check.constraint.is_met(snapshot) {
                Ok(met) => met,
                Err(err) => {
                    tracing::warn!(
                        command = %self.command.id(),
                        constraint = check.constraint.describe(),
                        error = %err,
                        "constraint predicate failed, treating as not met"
                    );
                    false
                }
            };

            if met {
                check.status = ConstraintStatus::Ok;
            } else if remaining.is_zero() {
                check.status = ConstraintStatus::TimedOut;
                return CheckOutcome::TimedOut;
            } else {
                next_check = next_check.min(remaining);
            }
        }

        match aggregate(self.checks.iter().map(|c| c.status)) {
            ConstraintStatus::Ok => CheckOutcome::Satisfied,
            ConstraintStatus::TimedOut => CheckOutcome::TimedOut,
            ConstraintStatus::Pending => CheckOutcome::Pending { next_check },
        }
    }
}
