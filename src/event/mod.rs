//! Event Module - audit trail for workflow execution
//!
//! Key types:
//! - `Event`: Envelope with id + timestamp + kind
//! - `EventKind`: workflow / job / step events
//! - `EventLog`: Thread-safe, append-only log

mod log;

// Re-export all public types
pub use log::{Event, EventKind, EventLog};
