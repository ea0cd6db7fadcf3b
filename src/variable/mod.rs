//! Variable Module - values, store, reference grammar (`${{ ns.path }}`)
//!
//! - `value`: `Value` sum type (simple vs complex, structured JSON)
//! - `store`: case-insensitive `VariableStore` with for-each overlays
//! - `template`: reference grammar and iterative substitution
//! - `mask`: secret masking for display text
//! - `walk`: `Walkable` object graphs → dotted-path leaves
//!
//! Data flow:
//! ```text
//! workflow text ──scan──▶ VariableStore (unresolved paths)
//!                              │
//!            namespace resolvers fill values
//!                              │
//!                              ▼
//!  step inputs / if / display ──substitute──▶ concrete values
//! ```

mod mask;
mod store;
pub mod template;
mod value;
mod walk;

pub use mask::{mask, mask_secret_references, mask_secret_values};
pub use store::{Variable, VariableStore};
pub use template::{
    contains_reference, references, sole_reference, substitute, Mode, Namespace, Reference,
    Substituted, NOT_NULL_TOKEN, NULL_TOKEN,
};
pub use value::{Handle, Value};
pub use walk::{Segment, Walkable, Walker};
