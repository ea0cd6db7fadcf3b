//! Action Module - action provider contract, registry and built-ins
//!
//! - `contract`: `ActionProvider` (discover / begin / process / end),
//!   `ActionMetadata`, `ActionContext`
//! - `registry`: `ActionRegistry` keyed by the step's `uses` identifier
//! - `builtin`: `core/echo`, `core/set-outputs`, `core/fail`, `core/cancel`

pub mod builtin;
mod contract;
mod registry;

pub use contract::{ActionContext, ActionMetadata, ActionProvider, InputSpec, OutputSpec};
pub use registry::{ActionFactory, ActionRegistry};
