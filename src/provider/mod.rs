//! Variable providers
//!
//! - [`ClientVariableProvider`]: full local resolution (all namespaces,
//!   display rendering with secret masking, step outputs)
//! - [`ServerVariableProvider`]: reduced resolution for steps executed on
//!   the task server (runner + server-side secrets, one substitution)

mod client;
mod server;

pub use client::{ClientVariableProvider, UnresolvedInput};
pub use server::{ServerVariable, ServerVariableProvider};
