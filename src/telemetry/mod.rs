//! Live telemetry: parameter values and the most-recent-value cache that
//! transmission constraints are evaluated against.

mod snapshot;
mod value;

pub use snapshot::ParameterSnapshot;
pub use value::{ParameterValue, Value};
