//! # Last-value parameter cache.
//!
//! [`ParameterSnapshot`] keeps the most recent [`ParameterValue`] per
//! parameter name. The telemetry feed delivers batches; the gate worker
//! merges them and predicates read the result.
//!
//! ## Rules
//! - Most recent value wins; a batch containing the same name twice keeps the
//!   later entry.
//! - The snapshot is owned by the gate worker and mutated only on its
//!   timeline, so it carries no locking.

use std::collections::HashMap;

use super::value::ParameterValue;

/// Most-recent value per named telemetry point.
#[derive(Default)]
pub struct ParameterSnapshot {
    values: HashMap<std::sync::Arc<str>, ParameterValue>,
}

impl ParameterSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a batch of samples, keeping the newest value per name.
    pub fn merge(&mut self, batch: Vec<ParameterValue>) {
        for pv in batch {
            self.values.insert(pv.name_arc(), pv);
        }
    }

    /// Returns the current value for `name`, if one has ever been seen.
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    /// Number of distinct parameters seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no parameter has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
