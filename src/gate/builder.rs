//! Builder wiring for the admission gate.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{GateConfig, DEFAULT_QUEUE};
use crate::error::ConfigError;
use crate::history::{HistorySink, NoopHistory};
use crate::observers::{Observe, ObserverSet};
use crate::privileges::{PrivilegeResolver, StaticPrivileges};
use crate::release::Releaser;
use crate::telemetry::ParameterSnapshot;

use super::handle::GateHandle;
use super::manager::AdmissionGate;
use super::queue::{CommandQueue, QueueState};

/// Builder for constructing an [`AdmissionGate`] with optional
/// collaborators.
///
/// The queue configuration and the uplink hand-off are mandatory; history,
/// privileges and observers default to no-ops (everything routes to
/// `default`, nothing is persisted).
pub struct GateBuilder {
    config: GateConfig,
    releaser: Arc<dyn Releaser>,
    history: Arc<dyn HistorySink>,
    privileges: Arc<dyn PrivilegeResolver>,
    observers: Vec<Arc<dyn Observe>>,
    channel_capacity: usize,
}

impl GateBuilder {
    /// Creates a builder from the queue configuration and the uplink
    /// hand-off.
    pub fn new(config: GateConfig, releaser: Arc<dyn Releaser>) -> Self {
        Self {
            config,
            releaser,
            history: Arc::new(NoopHistory),
            privileges: Arc::new(StaticPrivileges::default()),
            observers: Vec::new(),
            channel_capacity: 256,
        }
    }

    /// Sets the command-history sink.
    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    /// Sets the privilege resolver that drives routing.
    #[must_use]
    pub fn with_privileges(mut self, privileges: Arc<dyn PrivilegeResolver>) -> Self {
        self.privileges = privileges;
        self
    }

    /// Adds an initial observer (more can be registered at runtime).
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observe>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Sets the op-channel capacity (producers briefly back-pressure when it
    /// fills).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Validates the configuration and builds the gate and its handle.
    ///
    /// This consumes the builder and initializes all runtime components:
    /// the queues (in configuration order, with the built-in `default`
    /// queue injected if the configuration does not define one), the op
    /// channel, and the collaborator seams. The returned gate does nothing
    /// until [`AdmissionGate::run`] is spawned.
    pub fn build(self) -> Result<(AdmissionGate, GateHandle), ConfigError> {
        self.config.validate()?;

        let mut queues: Vec<CommandQueue> = self
            .config
            .queues()
            .iter()
            .map(CommandQueue::from_config)
            .collect();
        if !queues.iter().any(|q| q.name() == DEFAULT_QUEUE) {
            queues.push(CommandQueue::new(DEFAULT_QUEUE, QueueState::Blocked));
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity.max(1));
        let handle = GateHandle::new(tx.clone());
        let gate = AdmissionGate {
            queues,
            watchers: HashMap::new(),
            snapshot: ParameterSnapshot::new(),
            observers: ObserverSet::new(),
            initial_observers: self.observers,
            releaser: self.releaser,
            history: self.history,
            privileges: self.privileges,
            tx,
            rx,
        };
        Ok((gate, handle))
    }
}
