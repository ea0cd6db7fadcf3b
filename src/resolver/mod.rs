//! Namespace resolvers
//!
//! Each resolver owns one namespace and produces values for the still
//! unresolved keys under it. Keys passed in and returned are lower-cased
//! path suffixes (`env.HOME` → `home`).
//!
//! | Resolver | Namespace | Source |
//! |----------|-----------|--------|
//! | [`RunnerResolver`] | `runner.*` | OS / machine introspection, network probes |
//! | [`EnvironmentResolver`] | `env.*` | process environment |
//! | [`CacheResolver`] | `cache.*` | persisted user session ([`SessionCache`]) |
//! | [`SolutionResolver`] | `solution.*` | walked solution object |
//! | [`ForEachResolver`] | `foreach.*` | walked loop element |
//! | [`SecretsResolver`] | `secrets.*` / `server.*` | pluggable [`SecretResolver`] backend |
//!
//! Resolvers never fail: a backend error is logged and the key stays
//! unresolved, so only variables actually needed downstream stop a run.

mod cache;
mod environment;
mod for_each;
mod runner;
mod secrets;
mod solution;

pub use cache::{CacheResolver, FileSessionCache, SessionCache, SessionRecord, TokenRefresher};
pub use environment::EnvironmentResolver;
pub use for_each::ForEachResolver;
pub use runner::RunnerResolver;
pub use secrets::{EnvSecretResolver, SecretResolver, SecretsResolver, StaticSecretResolver};
pub use solution::SolutionResolver;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::variable::{Namespace, Value};

/// Produces values for pending keys under one namespace
///
/// # Example
/// ```rust,ignore
/// let env = EnvironmentResolver::new();
/// let found = env.resolve(&["home".to_string()]).await;
/// ```
#[async_trait]
pub trait NamespaceResolver: Send + Sync {
    fn namespace(&self) -> Namespace;

    /// Resolve what it can; missing keys stay absent from the result
    async fn resolve(&self, pending: &[String]) -> FxHashMap<String, Value>;
}
