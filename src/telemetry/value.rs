//! # Telemetry values.
//!
//! [`Value`] is the small tagged union the gate understands: enough to let a
//! transmission-constraint predicate compare a named telemetry point against
//! a literal. [`ParameterValue`] pairs a value with the parameter name and
//! the time it was generated.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A single telemetry value.
///
/// Integers and floats compare against each other (through `f64`); every
/// other cross-type comparison yields `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Signed integer sample.
    Integer(i64),
    /// Floating point sample.
    Float(f64),
    /// Boolean sample (e.g. a discrete status flag).
    Boolean(bool),
    /// Textual sample (e.g. an enumerated state name).
    Text(String),
}

impl Value {
    /// Compares two values, numerically where both sides are numeric.
    ///
    /// Returns `None` when the two values are not comparable (type mismatch,
    /// or a NaN float).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// A named telemetry sample, as delivered by the telemetry feed.
#[derive(Clone, Debug)]
pub struct ParameterValue {
    name: Arc<str>,
    value: Value,
    generation_time: SystemTime,
}

impl ParameterValue {
    /// Creates a sample stamped with the current wall-clock time.
    pub fn new(name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            generation_time: SystemTime::now(),
        }
    }

    /// Creates a sample with an explicit generation time.
    pub fn with_generation_time(mut self, at: SystemTime) -> Self {
        self.generation_time = at;
        self
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The sampled value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// When the sample was generated.
    pub fn generation_time(&self) -> SystemTime {
        self.generation_time
    }
}
