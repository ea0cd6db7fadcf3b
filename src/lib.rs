//! Nox - CLI workflow automation with `${{ }}` variable resolution
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/       YAML → Rust types (Workflow, Job, Action)        │
//! │  variable/  Value, references, store, masking, walking       │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  runtime/   Sequential execution (WorkflowExecutor)          │
//! │  provider/  Client / server variable providers               │
//! │  action/    Action provider contract + registry              │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  resolver/  Namespace resolvers (runner, env, cache, ...)    │
//! │  event/     Event sourcing (EventLog, EventKind)             │
//! │  util/      Constants                                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | YAML parsing → `Workflow`, `Job`, `Action` |
//! | [`variable`] | `${{ ns.path }}` grammar, `VariableStore`, secret masking |
//! | [`resolver`] | One resolver per namespace, fixed order |
//! | [`provider`] | Input resolution before / output storage after each step |
//! | [`action`] | discover → begin → process → end contract |
//! | [`runtime`] | Job/step state machine, `if` and `validate` expressions |
//! | [`event`] | Event sourcing for audit trail |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - YAML → Rust types
// ═══════════════════════════════════════════════════════════════
pub mod ast;
pub mod variable;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Execution logic
// ═══════════════════════════════════════════════════════════════
pub mod action;
pub mod provider;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Resolvers, events
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod resolver;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

pub use error::{FixSuggestion, NoxError, Result};

pub use config::NoxConfig;

pub use ast::{Action, ActionState, Job, JobState, Workflow};

pub use variable::{Namespace, Value, VariableStore};

pub use action::{ActionProvider, ActionRegistry};

pub use provider::{ClientVariableProvider, ServerVariableProvider};

pub use runtime::{RunStatus, RunSummary, WorkflowExecutor};

pub use event::{Event, EventKind, EventLog};
