//! # Gate configuration.
//!
//! [`GateConfig`] declares the command queues: name, initial state (which is
//! also the state a temporary override reverts to), optional override
//! expiration, and an optional significance allow-list. Queues are created
//! once from this configuration and live for the lifetime of the gate.
//!
//! Configuration errors are fatal: a gate is never started on a config that
//! failed validation (unknown state string, duplicate queue name, malformed
//! significance label).
//!
//! A queue named `default` always exists. If the configuration does not
//! define one, it is injected with state [`QueueState::Blocked`]: a blocked
//! gate holds commands for an operator rather than silently releasing or
//! rejecting them.
//!
//! ## Example
//! ```rust
//! use uplinkgate::GateConfig;
//!
//! let cfg = GateConfig::from_json(r#"{
//!     "queues": [
//!         { "name": "ops", "state": "enabled" },
//!         { "name": "critical_ops", "state": "blocked",
//!           "state_expiration_s": 60,
//!           "significances": ["critical", "severe"] }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(cfg.queues().len(), 2);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::commands::Significance;
use crate::error::ConfigError;
use crate::gate::QueueState;

/// Name of the queue that always exists and catches otherwise-unroutable
/// commands.
pub const DEFAULT_QUEUE: &str = "default";

/// Declaration of one command queue.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    name: String,
    state: QueueState,
    state_expiration: Option<Duration>,
    significances: Option<Vec<Significance>>,
}

impl QueueConfig {
    /// Declares a queue with the given name and initial (= default) state.
    pub fn new(name: impl Into<String>, state: QueueState) -> Self {
        Self {
            name: name.into(),
            state,
            state_expiration: None,
            significances: None,
        }
    }

    /// Sets how long a temporary state override lasts before the queue
    /// reverts to its default state.
    #[must_use]
    pub fn with_state_expiration(mut self, expiration: Duration) -> Self {
        self.state_expiration = Some(expiration);
        self
    }

    /// Restricts the queue to commands of the given significance levels.
    #[must_use]
    pub fn with_significances(
        mut self,
        significances: impl IntoIterator<Item = Significance>,
    ) -> Self {
        self.significances = Some(significances.into_iter().collect());
        self
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Initial and default state.
    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Override expiration, if configured.
    pub fn state_expiration(&self) -> Option<Duration> {
        self.state_expiration
    }

    /// Significance allow-list, if configured.
    pub fn significances(&self) -> Option<&[Significance]> {
        self.significances.as_deref()
    }
}

/// The full queue configuration of one gate.
#[derive(Clone, Debug, Default)]
pub struct GateConfig {
    queues: Vec<QueueConfig>,
}

impl GateConfig {
    /// Creates an empty configuration (the gate still gets the built-in
    /// `default` queue).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a queue declaration. Declaration order is preserved; it is
    /// the order queues are listed in on the operator surface.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queues.push(queue);
        self
    }

    /// The declared queues, in declaration order.
    pub fn queues(&self) -> &[QueueConfig] {
        &self.queues
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let raw: RawGateConfig = serde_json::from_str(s)?;
        let mut cfg = GateConfig::new();
        for queue in raw.queues {
            cfg.queues.push(queue.try_into()?);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration. Called by the gate builder; exposed so a
    /// deployment can fail fast before wiring anything else.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, queue) in self.queues.iter().enumerate() {
            if self.queues[..i].iter().any(|q| q.name == queue.name) {
                return Err(ConfigError::DuplicateQueue {
                    name: queue.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawGateConfig {
    #[serde(default)]
    queues: Vec<RawQueueConfig>,
}

#[derive(Deserialize)]
struct RawQueueConfig {
    name: String,
    state: String,
    #[serde(default)]
    state_expiration_s: Option<u64>,
    #[serde(default)]
    significances: Option<Vec<String>>,
}

impl TryFrom<RawQueueConfig> for QueueConfig {
    type Error = ConfigError;

    fn try_from(raw: RawQueueConfig) -> Result<Self, Self::Error> {
        let state: QueueState = raw.state.parse()?;
        let mut queue = QueueConfig::new(raw.name, state);
        if let Some(secs) = raw.state_expiration_s {
            queue = queue.with_state_expiration(Duration::from_secs(secs));
        }
        if let Some(labels) = raw.significances {
            let mut levels = Vec::with_capacity(labels.len());
            for label in labels {
                levels.push(label.parse::<Significance>()?);
            }
            queue = queue.with_significances(levels);
        }
        Ok(queue)
    }
}
