//! Gate events delivered to registered observers.

mod event;

pub use event::{Event, EventKind};
