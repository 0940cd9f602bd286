//! # Transmission constraints.
//!
//! A [`TransmissionConstraint`] is a predicate over live telemetry plus a
//! timeout: the predicate must hold before the command may be released, and
//! if it has not held by the deadline the command is rejected.
//!
//! ## Rules
//! - Predicates are evaluated against the worker's [`ParameterSnapshot`];
//!   they must be fast and non-blocking.
//! - A predicate that returns an error is treated as "not met this round" by
//!   the watcher: logged, never fatal.
//! - A `timeout` of zero means the predicate must hold on the very first
//!   check, or the constraint times out immediately. It does not mean "never
//!   time out".
//!
//! The predicate language itself is out of scope; [`Predicate`] is the
//! evaluation contract, and [`ParameterCompare`] is the one comparison
//! shipped with the crate (a named parameter against a literal value).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::telemetry::{ParameterSnapshot, Value};

/// Error raised by a predicate evaluation.
///
/// Watchers recover from this locally: the constraint simply counts as not
/// met for that check.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct PredicateError {
    message: String,
}

impl PredicateError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Evaluation contract for transmission-constraint predicates.
pub trait Predicate: Send + Sync {
    /// Evaluates the predicate against the current snapshot.
    ///
    /// Must be fast and non-blocking; it runs on the gate worker's timeline.
    fn is_met(&self, snapshot: &ParameterSnapshot) -> Result<bool, PredicateError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String {
        "predicate".to_string()
    }
}

/// One `(predicate, timeout)` pair of a command's constraint list.
#[derive(Clone)]
pub struct TransmissionConstraint {
    predicate: Arc<dyn Predicate>,
    timeout: Duration,
}

impl TransmissionConstraint {
    /// Creates a constraint from a predicate and its timeout budget.
    pub fn new(predicate: Arc<dyn Predicate>, timeout: Duration) -> Self {
        Self { predicate, timeout }
    }

    /// The timeout budget, measured from the watcher's first check.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evaluates the predicate against `snapshot`.
    pub fn is_met(&self, snapshot: &ParameterSnapshot) -> Result<bool, PredicateError> {
        self.predicate.is_met(snapshot)
    }

    /// Description of the underlying predicate.
    pub fn describe(&self) -> String {
        self.predicate.describe()
    }
}

impl fmt::Debug for TransmissionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransmissionConstraint")
            .field("predicate", &self.predicate.describe())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Comparison operator for [`ParameterCompare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Predicate comparing one named parameter against a literal value.
///
/// A parameter that has never been seen counts as "not met" (telemetry may
/// simply not have arrived yet); a parameter whose value cannot be compared
/// against the reference (type mismatch) is an evaluation error.
pub struct ParameterCompare {
    parameter: Arc<str>,
    op: CompareOp,
    reference: Value,
}

impl ParameterCompare {
    /// Creates a comparison of `parameter` against `reference`.
    pub fn new(parameter: impl Into<Arc<str>>, op: CompareOp, reference: impl Into<Value>) -> Self {
        Self {
            parameter: parameter.into(),
            op,
            reference: reference.into(),
        }
    }
}

impl Predicate for ParameterCompare {
    fn is_met(&self, snapshot: &ParameterSnapshot) -> Result<bool, PredicateError> {
        let Some(pv) = snapshot.get(&self.parameter) else {
            return Ok(false);
        };
        let Some(ordering) = pv.value().compare(&self.reference) else {
            return Err(PredicateError::new(format!(
                "cannot compare {} value {} against {}",
                self.parameter,
                pv.value(),
                self.reference
            )));
        };
        let met = match self.op {
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Ge => ordering.is_ge(),
        };
        Ok(met)
    }

    fn describe(&self) -> String {
        format!("{} {} {}", self.parameter, self.op.as_str(), self.reference)
    }
}
