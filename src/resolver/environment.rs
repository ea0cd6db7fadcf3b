//! `env.*` → process environment (names upper-cased for lookup)

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::variable::{Namespace, Value};

use super::NamespaceResolver;

#[derive(Debug, Clone, Default)]
pub struct EnvironmentResolver;

impl EnvironmentResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NamespaceResolver for EnvironmentResolver {
    fn namespace(&self) -> Namespace {
        Namespace::Env
    }

    async fn resolve(&self, pending: &[String]) -> FxHashMap<String, Value> {
        pending
            .iter()
            .filter_map(|key| {
                std::env::var(key.to_uppercase())
                    .ok()
                    .map(|v| (key.clone(), Value::String(v)))
            })
            .collect()
    }
}
