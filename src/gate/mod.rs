//! The gate core: queues, constraint watchers, and the single-writer
//! admission worker.

mod builder;
mod handle;
mod manager;
mod queue;
mod watcher;

pub use builder::GateBuilder;
pub use handle::{GateHandle, SubmitReceipt};
pub use manager::AdmissionGate;
pub use queue::{PendingCommand, QueueInfo, QueueState};
pub use watcher::ConstraintStatus;
