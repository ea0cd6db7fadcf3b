//! Runtime Module - Workflow execution
//!
//! Contains the runtime execution components:
//! - `executor`: Sequential job/step state machine (WorkflowExecutor)
//! - `context`: Workflow, variables and cancellation for one run
//! - `expression`: Boolean `if` / `validate` expressions
//! - `remote`: Task server protocol for `run-at-server` steps
//! - `status`: Console status lines
//!
//! This module represents the "how" - runtime execution.
//! For static structure, see the `ast` module.

mod context;
mod executor;
pub mod expression;
pub mod remote;
mod status;

// Re-export public types
pub use context::WorkflowContext;
pub use executor::{JobReport, RunStatus, RunSummary, StepReport, WorkflowExecutor};
pub use remote::{HealthInfo, HttpTaskClient, InProcessTaskServer, RemoteTaskExecutor, TaskOutcome, TaskRequest};
pub use status::StatusPrinter;
