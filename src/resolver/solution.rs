//! `solution.*` → walk of the loaded solution object

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::{NoxError, Result};
use crate::util::MAX_WALK_DEPTH;
use crate::variable::{Namespace, Value, Walkable, Walker};

use super::NamespaceResolver;

pub struct SolutionResolver {
    root: Arc<dyn Walkable + Send + Sync>,
    max_depth: usize,
}

impl SolutionResolver {
    pub fn new(root: Arc<dyn Walkable + Send + Sync>) -> Self {
        Self {
            root,
            max_depth: MAX_WALK_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Load a YAML or JSON solution file as a walkable document
    pub fn load(path: &Path) -> Result<Arc<dyn Walkable + Send + Sync>> {
        let text = std::fs::read_to_string(path).map_err(|e| NoxError::ConfigError {
            reason: format!("Failed to read solution file {}: {}", path.display(), e),
        })?;
        let doc: serde_json::Value =
            serde_yaml::from_str(&text).map_err(|e| NoxError::ConfigError {
                reason: format!("Failed to parse solution file {}: {}", path.display(), e),
            })?;
        Ok(Arc::new(doc))
    }
}

#[async_trait]
impl NamespaceResolver for SolutionResolver {
    fn namespace(&self) -> Namespace {
        Namespace::Solution
    }

    async fn resolve(&self, pending: &[String]) -> FxHashMap<String, Value> {
        let wanted: FxHashSet<String> = pending.iter().cloned().collect();
        let found = Walker::collect(self.root.as_ref(), &wanted, self.max_depth);
        debug!(pending = pending.len(), found = found.len(), "solution walk");
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn resolves_nested_paths() {
        let solution = json!({
            "name": "shop",
            "environments": [{"name": "dev"}, {"name": "prod"}]
        });
        let resolver = SolutionResolver::new(Arc::new(solution));
        let found = resolver
            .resolve(&[
                "name".into(),
                "environments".into(),
                "environments[1].name".into(),
                "missing".into(),
            ])
            .await;

        assert_eq!(found["name"], Value::from("shop"));
        assert_eq!(found["environments[1].name"], Value::from("prod"));
        assert!(found["environments"].is_complex());
        assert!(!found.contains_key("missing"));
    }

    #[tokio::test]
    async fn loads_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("solution.yaml");
        std::fs::write(&path, "name: shop\nowner:\n  team: platform\n").unwrap();

        let resolver = SolutionResolver::new(SolutionResolver::load(&path).unwrap());
        let found = resolver.resolve(&["owner.team".into()]).await;
        assert_eq!(found["owner.team"], Value::from("platform"));
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let err = SolutionResolver::load(Path::new("/no/solution.yaml")).err().unwrap();
        assert_eq!(err.code(), "NOX-090");
    }
}
