//! `foreach.*` → walk of the current loop element
//!
//! Besides the element's own fields, `foreach.index` (0-based) and
//! `foreach.value` (the whole element) are available unless the element
//! defines keys of the same name.

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::util::MAX_WALK_DEPTH;
use crate::variable::{Namespace, Value, Walker};

use super::NamespaceResolver;

#[derive(Debug, Clone)]
pub struct ForEachResolver {
    element: Value,
    index: usize,
    max_depth: usize,
}

impl ForEachResolver {
    pub fn new(element: Value, index: usize) -> Self {
        Self {
            element: element.normalize(),
            index,
            max_depth: MAX_WALK_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn element(&self) -> &Value {
        &self.element
    }
}

#[async_trait]
impl NamespaceResolver for ForEachResolver {
    fn namespace(&self) -> Namespace {
        Namespace::ForEach
    }

    async fn resolve(&self, pending: &[String]) -> FxHashMap<String, Value> {
        let wanted: FxHashSet<String> = pending.iter().cloned().collect();
        let mut found = Walker::collect(&self.element, &wanted, self.max_depth);

        if wanted.contains("index") {
            found
                .entry("index".to_string())
                .or_insert(Value::from(self.index as u64));
        }
        if wanted.contains("value") {
            found
                .entry("value".to_string())
                .or_insert_with(|| self.element.clone());
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_element_fields() {
        let element = Value::from(json!({"id": 1, "tags": ["a", "b"]}));
        let found = ForEachResolver::new(element, 0)
            .resolve(&["id".into(), "tags[1]".into(), "index".into()])
            .await;
        assert_eq!(found["id"], Value::Int(1));
        assert_eq!(found["tags[1]"], Value::from("b"));
        assert_eq!(found["index"], Value::Int(0));
    }

    #[tokio::test]
    async fn scalar_element_is_the_value() {
        let found = ForEachResolver::new(Value::from("westeurope"), 3)
            .resolve(&["value".into(), "index".into()])
            .await;
        assert_eq!(found["value"], Value::from("westeurope"));
        assert_eq!(found["index"], Value::Int(3));
    }

    #[tokio::test]
    async fn element_keys_shadow_builtins() {
        let element = Value::from(json!({"index": "custom"}));
        let found = ForEachResolver::new(element, 7).resolve(&["index".into()]).await;
        assert_eq!(found["index"], Value::from("custom"));
    }
}
