//! Error types used by the gate runtime and its configuration loader.
//!
//! This module defines two main error enums:
//!
//! - [`ConfigError`] — fatal errors raised while loading or validating the
//!   queue configuration. These prevent the gate from starting at all.
//! - [`GateError`] — errors surfaced by [`GateHandle`](crate::GateHandle)
//!   calls at runtime.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics.

use thiserror::Error;

/// # Fatal configuration errors.
///
/// Raised while parsing or validating a [`GateConfig`](crate::GateConfig).
/// Any of these means the configuration file is wrong and the gate must not
/// start.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A queue `state` string is not one of the three known states.
    #[error("'{value}' is not a valid queue state. Use one of enabled, disabled or blocked")]
    InvalidState {
        /// The offending state string.
        value: String,
    },

    /// Two queue definitions share the same name.
    #[error("duplicate queue name '{name}'")]
    DuplicateQueue {
        /// The duplicated queue name.
        name: String,
    },

    /// A significance label in a queue filter is not a known consequence level.
    #[error("'{value}' is not a valid significance level")]
    InvalidSignificance {
        /// The offending significance string.
        value: String,
    },

    /// The configuration document itself could not be parsed.
    #[error("malformed gate configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidState { .. } => "config_invalid_state",
            ConfigError::DuplicateQueue { .. } => "config_duplicate_queue",
            ConfigError::InvalidSignificance { .. } => "config_invalid_significance",
            ConfigError::Parse(_) => "config_parse",
        }
    }
}

/// # Errors surfaced by gate handle calls.
///
/// Runtime failures are deliberately few: command rejections are not errors
/// (they are ordinary outcomes reported through events and history records),
/// and a release/reject of an unknown command id is an `Option::None`, not an
/// error. What remains is "the queue you named does not exist" and "the gate
/// worker is gone".
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GateError {
    /// No queue with the given name exists. No internal state was mutated.
    #[error("no queue named '{name}'")]
    QueueNotFound {
        /// The unknown queue name.
        name: String,
    },

    /// The gate worker has stopped (its channel is closed).
    #[error("gate worker is not running")]
    Closed,
}

impl GateError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use uplinkgate::GateError;
    ///
    /// assert_eq!(GateError::Closed.as_label(), "gate_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            GateError::QueueNotFound { .. } => "queue_not_found",
            GateError::Closed => "gate_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            GateError::QueueNotFound { name } => format!("no queue named '{name}'"),
            GateError::Closed => "gate worker is not running".to_string(),
        }
    }
}
