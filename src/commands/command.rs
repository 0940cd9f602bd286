//! # Commands awaiting release.
//!
//! A [`Command`] is a single outbound instruction heading for the vehicle.
//! The gate treats it as opaque beyond the fields it routes and gates on:
//! identity, significance, and the transmission-constraint list. Building the
//! binary itself, and verifying execution after release, happen elsewhere.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use std::sync::Arc;
//! use uplinkgate::{Command, CompareOp, ParameterCompare, Significance, TransmissionConstraint};
//!
//! let cmd = Command::new("/bus/switch_heater_on")
//!     .with_origin("operator1")
//!     .with_significance(Significance::Critical)
//!     .with_constraint(TransmissionConstraint::new(
//!         Arc::new(ParameterCompare::new("bus_voltage", CompareOp::Ge, 24)),
//!         Duration::from_secs(5),
//!     ));
//!
//! assert!(cmd.has_constraints());
//! assert_eq!(cmd.significance(), Significance::Critical);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

use super::constraint::TransmissionConstraint;

/// Globally unique command identifier.
///
/// Opaque and comparable; generated once when the command is built and used
/// everywhere the command is referenced (manual release/reject, history
/// records, events).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandId({})", self.0)
    }
}

/// Severity classification of a command (consequence level).
///
/// Queues may restrict which significances they accept; a command without an
/// assigned significance carries the literal [`Significance::None`] label,
/// which filters match by the string `"none"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    /// No particular consequence.
    #[default]
    None,
    /// Worth watching, routinely sent.
    Watch,
    /// May degrade the mission if mis-sent.
    Warning,
    /// Sent in response to distress conditions.
    Distress,
    /// May cause irreversible harm if mis-sent.
    Critical,
    /// Gravest level; typically double-gated operationally.
    Severe,
}

impl Significance {
    /// The lowercase label used in configuration filters.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Significance::None => "none",
            Significance::Watch => "watch",
            Significance::Warning => "warning",
            Significance::Distress => "distress",
            Significance::Critical => "critical",
            Significance::Severe => "severe",
        }
    }
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Significance {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.to_ascii_lowercase().as_str() {
            "none" => Significance::None,
            "watch" => Significance::Watch,
            "warning" => Significance::Warning,
            "distress" => Significance::Distress,
            "critical" => Significance::Critical,
            "severe" => Significance::Severe,
            _ => {
                return Err(ConfigError::InvalidSignificance {
                    value: s.to_string(),
                })
            }
        };
        Ok(level)
    }
}

/// A single outbound command awaiting admission and release.
///
/// Consumed exactly once by the gate: released downstream or rejected, never
/// both.
#[derive(Clone, Debug)]
pub struct Command {
    id: CommandId,
    name: Arc<str>,
    origin: Arc<str>,
    significance: Significance,
    constraints: Vec<TransmissionConstraint>,
}

impl Command {
    /// Creates a command with a fresh id, no significance and no constraints.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: CommandId::new(),
            name: name.into(),
            origin: Arc::from(""),
            significance: Significance::None,
            constraints: Vec::new(),
        }
    }

    /// Sets the submitting identity (used in history records and rejection
    /// reasons).
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<Arc<str>>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the significance level.
    #[must_use]
    pub fn with_significance(mut self, significance: Significance) -> Self {
        self.significance = significance;
        self
    }

    /// Appends one transmission constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: TransmissionConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Replaces the constraint list.
    #[must_use]
    pub fn with_constraints(mut self, constraints: Vec<TransmissionConstraint>) -> Self {
        self.constraints = constraints;
        self
    }

    /// The command's unique id.
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Fully qualified command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The submitting identity.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The significance level (defaults to [`Significance::None`]).
    pub fn significance(&self) -> Significance {
        self.significance
    }

    /// The ordered transmission-constraint list.
    pub fn constraints(&self) -> &[TransmissionConstraint] {
        &self.constraints
    }

    /// True if the command declares at least one transmission constraint.
    pub fn has_constraints(&self) -> bool {
        !self.constraints.is_empty()
    }
}
