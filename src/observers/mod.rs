//! Observer fan-out: monitoring clients that receive gate events.

mod observer;
mod set;

#[cfg(feature = "logging")]
mod log;

pub use observer::{Observe, ObserverError};
pub use set::ObserverSet;

#[cfg(feature = "logging")]
pub use log::EventLog;
