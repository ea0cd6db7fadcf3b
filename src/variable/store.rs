//! VariableStore - case-insensitive path → variable mapping
//!
//! Keys are lower-cased dotted paths; the first spelling seen is kept for
//! display. Values are monotonic within a scope: once resolved, a variable
//! is never reset to unresolved. For-each iterations push an overlay scope
//! holding the loop-local `foreach.*` values, which vanish when the iteration
//! ends. Every other namespace is written to the base scope, so step outputs
//! produced inside a loop outlive it (the last iteration wins).

use rustc_hash::FxHashMap;

use super::template::Namespace;
use super::value::Value;

/// A single variable known to the store
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Dotted path as first written (`steps.Build.outputs.Id`)
    pub path: String,
    /// Resolved value; `None` while unresolved
    pub value: Option<Value>,
    /// Masked in display text
    pub is_secret: bool,
}

impl Variable {
    pub fn unresolved(path: impl Into<String>) -> Self {
        let path = path.into();
        let is_secret = Namespace::of_path(&path).is_some_and(|ns| ns.is_secret());
        Self {
            path,
            value: None,
            is_secret,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_null())
    }
}

type Scope = FxHashMap<String, Variable>;

#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    base: Scope,
    overlays: Vec<Scope>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &str) -> String {
        path.trim().to_lowercase()
    }

    /// Scope a path is written to: `foreach.*` lives in the innermost overlay
    fn scope_mut(&mut self, path: &str) -> &mut Scope {
        if Namespace::of_path(path) != Some(Namespace::ForEach) {
            return &mut self.base;
        }
        match self.overlays.last_mut() {
            Some(scope) => scope,
            None => &mut self.base,
        }
    }

    /// Register a path as known-but-unresolved (no-op if already present)
    pub fn insert_unresolved(&mut self, path: &str) {
        let key = Self::key(path);
        if self.lookup(&key).is_none() {
            self.scope_mut(&key)
                .insert(key, Variable::unresolved(path.trim()));
        }
    }

    /// Set a value (`foreach.*` in the innermost scope, the rest in the base)
    ///
    /// `Null` never clears an already-resolved variable.
    pub fn set(&mut self, path: &str, value: Value) {
        let value = value.normalize();
        let key = Self::key(path);
        if value.is_null() && self.get(path).is_some() {
            return;
        }

        let template = self
            .lookup(&key)
            .cloned()
            .unwrap_or_else(|| Variable::unresolved(path.trim()));
        let scope = self.scope_mut(&key);
        let entry = scope.entry(key).or_insert(template);
        entry.value = Some(value);
    }

    /// Set a value and force the secret flag
    pub fn set_secret(&mut self, path: &str, value: Value) {
        self.set(path, value);
        let key = Self::key(path);
        if let Some(var) = self.scope_mut(&key).get_mut(&key) {
            var.is_secret = true;
        }
    }

    fn lookup(&self, key: &str) -> Option<&Variable> {
        self.overlays
            .iter()
            .rev()
            .find_map(|scope| scope.get(key))
            .or_else(|| self.base.get(key))
    }

    /// Variable metadata (resolved or not)
    pub fn variable(&self, path: &str) -> Option<&Variable> {
        self.lookup(&Self::key(path))
    }

    /// Resolved value, innermost scope first
    ///
    /// A scope holding an unresolved entry falls through to outer scopes.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let key = Self::key(path);
        self.overlays
            .iter()
            .rev()
            .chain(std::iter::once(&self.base))
            .filter_map(|scope| scope.get(&key))
            .find(|var| var.is_resolved())
            .and_then(|var| var.value.as_ref())
    }

    pub fn is_resolved(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.variable(path).is_some()
    }

    /// Unresolved keys under a namespace, relative to it (lower-cased)
    pub fn pending(&self, namespace: Namespace) -> Vec<String> {
        let prefix = format!("{}.", namespace.as_str());
        let mut keys: Vec<String> = self
            .iter()
            .filter(|var| !var.is_resolved())
            .filter_map(|var| {
                Self::key(&var.path)
                    .strip_prefix(&prefix)
                    .map(str::to_string)
            })
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Every visible variable (innermost definition wins)
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        let mut seen: FxHashMap<&str, &Variable> = FxHashMap::default();
        for scope in std::iter::once(&self.base).chain(self.overlays.iter()) {
            for (key, var) in scope {
                if var.is_resolved() || !seen.contains_key(key.as_str()) {
                    seen.insert(key.as_str(), var);
                }
            }
        }
        let mut vars: Vec<&Variable> = seen.into_values().collect();
        vars.sort_by(|a, b| a.path.cmp(&b.path));
        vars.into_iter()
    }

    /// Resolved secret values (for the post-substitution masking pass)
    pub fn secret_values(&self) -> Vec<String> {
        self.iter()
            .filter(|var| var.is_secret)
            .filter_map(|var| var.value.as_ref())
            .filter(|v| v.is_simple())
            .map(Value::to_display_string)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Open an overlay scope (for-each iteration)
    pub fn push_scope(&mut self) {
        self.overlays.push(Scope::default());
    }

    /// Drop the innermost overlay and everything written into it
    pub fn pop_scope(&mut self) {
        self.overlays.pop();
    }

    pub fn scope_depth(&self) -> usize {
        self.overlays.len()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.overlays.iter().all(|s| s.is_empty())
    }
}
