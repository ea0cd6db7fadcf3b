//! AST Module - document model for YAML workflows
//!
//! Contains parsed Rust types from YAML workflow definitions:
//! - `workflow`: Workflow, Job, JobState
//! - `action`: Action, ActionInput, ActionState, DisplayMessages, Validation
//!
//! These types represent the "what" - static structure parsed from YAML.
//! Step inputs, display text and conditions are rewritten in place as
//! variables resolve; for execution see the `runtime` module.

mod action;
mod workflow;

// Re-export all public types
pub use action::{
    Action, ActionInput, ActionState, Assertion, AssertionKind, DisplayMessages, Validation,
};
pub use workflow::{Job, JobState, Workflow};
