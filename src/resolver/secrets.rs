//! `secrets.*` / `server.*` → pluggable secret backends
//!
//! Resolved values are stored flagged secret and only ever rendered masked.
//! Nothing here logs a value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::config::DEFAULT_SECRET_ENV_PREFIX;
use crate::error::Result;
use crate::variable::{Namespace, Value};

use super::NamespaceResolver;

/// Secret backend contract
///
/// Keys are lower-cased path suffixes; unknown keys are simply absent from
/// the result.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, keys: &[String]) -> Result<FxHashMap<String, String>>;
}

/// Reads `<prefix><KEY>` from the process environment (`.` → `_`)
#[derive(Debug, Clone)]
pub struct EnvSecretResolver {
    prefix: String,
}

impl EnvSecretResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn env_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace('.', "_").to_uppercase())
    }
}

impl Default for EnvSecretResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET_ENV_PREFIX)
    }
}

#[async_trait]
impl SecretResolver for EnvSecretResolver {
    async fn resolve(&self, keys: &[String]) -> Result<FxHashMap<String, String>> {
        Ok(keys
            .iter()
            .filter_map(|key| {
                std::env::var(self.env_name(key))
                    .ok()
                    .map(|value| (key.clone(), value))
            })
            .collect())
    }
}

/// In-memory secrets (tests, embedders)
#[derive(Debug, Clone, Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<String, String>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.secrets.insert(key.to_lowercase(), value.into());
        self
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn resolve(&self, keys: &[String]) -> Result<FxHashMap<String, String>> {
        Ok(keys
            .iter()
            .filter_map(|key| self.secrets.get(key).map(|v| (key.clone(), v.clone())))
            .collect())
    }
}

/// Adapts a [`SecretResolver`] backend to one namespace
pub struct SecretsResolver {
    namespace: Namespace,
    backend: Arc<dyn SecretResolver>,
}

impl SecretsResolver {
    pub fn new(namespace: Namespace, backend: Arc<dyn SecretResolver>) -> Self {
        Self { namespace, backend }
    }
}

#[async_trait]
impl NamespaceResolver for SecretsResolver {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    async fn resolve(&self, pending: &[String]) -> FxHashMap<String, Value> {
        if pending.is_empty() {
            return FxHashMap::default();
        }
        match self.backend.resolve(pending).await {
            Ok(found) => {
                debug!(namespace = %self.namespace, requested = pending.len(), found = found.len(), "secrets resolved");
                found
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect()
            }
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e, "secret backend failed");
                FxHashMap::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoxError;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn env_backend_maps_dotted_keys() {
        std::env::set_var("NOX_SECRET_DB_PASSWORD", "s3cret");
        let found = EnvSecretResolver::default()
            .resolve(&["db.password".into(), "absent".into()])
            .await
            .unwrap();
        std::env::remove_var("NOX_SECRET_DB_PASSWORD");

        assert_eq!(found.get("db.password").map(String::as_str), Some("s3cret"));
        assert!(!found.contains_key("absent"));
    }

    #[tokio::test]
    async fn static_backend_is_case_insensitive() {
        let backend = StaticSecretResolver::new().with("ApiKey", "k-123");
        let resolver = SecretsResolver::new(Namespace::Secrets, Arc::new(backend));
        let found = resolver.resolve(&["apikey".into()]).await;
        assert_eq!(found["apikey"], Value::from("k-123"));
    }

    struct Broken;

    #[async_trait]
    impl SecretResolver for Broken {
        async fn resolve(&self, _: &[String]) -> Result<FxHashMap<String, String>> {
            Err(NoxError::SecretError {
                reason: "vault sealed".into(),
            })
        }
    }

    #[tokio::test]
    async fn backend_failure_leaves_keys_unresolved() {
        let resolver = SecretsResolver::new(Namespace::Server, Arc::new(Broken));
        assert!(resolver.resolve(&["token".into()]).await.is_empty());
    }
}
