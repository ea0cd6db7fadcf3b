//! Centralized constants for Nox runtime configuration
//!
//! All timeout and limit values in one place for easy tuning.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// Network Timeouts
// ═══════════════════════════════════════════════════════════════

/// Client-side timeout for the runner's network reachability probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Timeout for a remote task-server call (health probe and task dispatch)
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for establishing task-server connections
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════
// Resolution Limits
// ═══════════════════════════════════════════════════════════════

/// Depth guard for object-graph walking (solution / for-each resolvers)
pub const MAX_WALK_DEPTH: usize = 50;

/// Upper bound on substitution passes over a single text
pub const MAX_SUBSTITUTION_PASSES: usize = 16;

/// Distinct texts kept in the reference cache before it is cleared
pub const REFERENCE_CACHE_CAPACITY: usize = 4096;

/// Longest mask rendered in place of a secret value
pub const MASK_MAX_LEN: usize = 20;
