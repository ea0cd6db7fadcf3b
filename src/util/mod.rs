//! Utilities Module - shared infrastructure
//!
//! - `constants`: Centralized timeouts and limits

pub mod constants;

// Re-export public types
pub use constants::{
    DEFAULT_PROBE_TIMEOUT, MASK_MAX_LEN, MAX_SUBSTITUTION_PASSES, MAX_WALK_DEPTH,
    REFERENCE_CACHE_CAPACITY, REMOTE_TIMEOUT,
};
