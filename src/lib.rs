//! # uplinkgate
//!
//! **uplinkgate** is the command-admission and release-gating layer of a
//! spacecraft command & control processor. Every outbound command passes
//! through it before reaching the uplink transport: the gate decides which
//! queue the command belongs to, whether that queue currently allows
//! release, and, if the command declares transmission constraints, whether
//! those constraints hold against live telemetry before their timeout.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  operators / transports          telemetry feed          timers
//!   submit · set state · release       │                     │
//!   reject · snapshots                 │                     │
//!          │ (GateHandle)              │                     │
//!          ▼                           ▼                     ▼
//! ┌─────────────────────────── op channel ───────────────────────────────┐
//! │  AdmissionGate (single-writer worker)                                │
//! │  - CommandQueue[*]: state machine ENABLED/DISABLED/BLOCKED,          │
//! │    default state, timed reversion, significance filter, counters     │
//! │  - ConstraintWatcher[*]: per-command constraint state table with     │
//! │    deadlines, telemetry-triggered and timer-triggered re-checks      │
//! │  - ParameterSnapshot: most recent value per telemetry point          │
//! │  - ObserverSet: bounded per-observer fan-out                         │
//! └──────┬─────────────────────┬────────────────────────────┬────────────┘
//!        ▼                     ▼                            ▼
//!    Releaser             HistorySink                  observers
//!  (uplink hand-off)   (fire-and-forget audit)    (added/sent/rejected/
//!                                                   state-changed events)
//! ```
//!
//! ### Command lifecycle
//! ```text
//! submit(user, command)
//!   ├─► route: first queue in the user's privilege order whose
//!   │          significance filter accepts the command, else `default`
//!   ├─► queue DISABLED ──► rejected ("Commanding Queue disabled")
//!   ├─► queue BLOCKED ───► parked until an operator acts
//!   └─► queue ENABLED
//!         ├─ no constraints ──► released immediately
//!         └─ constraints ─────► ConstraintWatcher
//!              ├─ all Ok ─────────────► released
//!              ├─ any TimedOut ───────► rejected ("Transmission
//!              │                        constraints check failed")
//!              └─ still Pending ──────► re-check at min(remaining
//!                                       deadlines) or on new telemetry
//! ```
//!
//! Everything that mutates gate state (submissions, telemetry batches,
//! operator actions, timer callbacks) is serialized through one worker
//! task. There is no locking in the core and no way for a command to be
//! disposed twice: removal from its queue is the first step of every
//! terminal transition.
//!
//! ## Features
//! | Area            | Description                                               | Key types / traits                  |
//! |-----------------|-----------------------------------------------------------|-------------------------------------|
//! | **Queues**      | Named queues with enable/disable/block and timed revert.  | [`QueueConfig`], [`QueueState`]     |
//! | **Routing**     | Privilege-ordered, significance-filtered queue selection. | [`PrivilegeResolver`]               |
//! | **Constraints** | Timeout-bounded predicates over live telemetry.           | [`TransmissionConstraint`], [`Predicate`] |
//! | **Events**      | Live feed of add/sent/rejected/state-changed.             | [`Observe`], [`Event`]              |
//! | **History**     | Fire-and-forget audit records per command state change.   | [`HistorySink`], [`HistoryRecord`]  |
//! | **Uplink**      | Non-blocking hand-off of released commands.               | [`Releaser`], [`ChannelReleaser`]   |
//!
//! ## Optional features
//! - `logging`: exports [`EventLog`], an observer that writes every gate
//!   event through `tracing` _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use uplinkgate::{
//!     AdmissionGate, ChannelReleaser, Command, CompareOp, GateConfig, ParameterCompare,
//!     ParameterValue, QueueConfig, QueueState, TransmissionConstraint,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GateConfig::new()
//!         .with_queue(QueueConfig::new("default", QueueState::Enabled));
//!
//!     let (releaser, mut uplink) = ChannelReleaser::new();
//!     let (gate, handle) = AdmissionGate::builder(config, Arc::new(releaser)).build()?;
//!
//!     let shutdown = CancellationToken::new();
//!     tokio::spawn(gate.run(shutdown.clone()));
//!
//!     // Gate a heater command on bus voltage, with a 5 second budget.
//!     let command = Command::new("/eps/heater_on").with_constraint(TransmissionConstraint::new(
//!         Arc::new(ParameterCompare::new("bus_voltage", CompareOp::Ge, 24)),
//!         Duration::from_secs(5),
//!     ));
//!     handle.submit("operator1", command).await?;
//!
//!     // Telemetry arrives; the constraint is satisfied and the command
//!     // reaches the uplink channel.
//!     handle
//!         .update_parameters(vec![ParameterValue::new("bus_voltage", 28)])
//!         .await?;
//!     let released = uplink.recv().await;
//!     assert!(released.is_some());
//!
//!     shutdown.cancel();
//!     Ok(())
//! }
//! ```

mod commands;
mod config;
mod error;
mod events;
mod gate;
mod history;
mod observers;
mod privileges;
mod release;
mod telemetry;

// ---- Public re-exports ----

pub use commands::{
    Command, CommandId, CompareOp, ParameterCompare, Predicate, PredicateError, Significance,
    TransmissionConstraint,
};
pub use config::{GateConfig, QueueConfig, DEFAULT_QUEUE};
pub use error::{ConfigError, GateError};
pub use events::{Event, EventKind};
pub use gate::{
    AdmissionGate, ConstraintStatus, GateBuilder, GateHandle, PendingCommand, QueueInfo,
    QueueState, SubmitReceipt,
};
pub use history::{HistoryKey, HistoryRecord, HistorySink, NoopHistory};
pub use observers::{Observe, ObserverError, ObserverSet};
pub use privileges::{PrivilegeResolver, StaticPrivileges};
pub use release::{ChannelReleaser, Releaser};
pub use telemetry::{ParameterSnapshot, ParameterValue, Value};

// Optional: expose a simple built-in logger observer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observers::EventLog;
