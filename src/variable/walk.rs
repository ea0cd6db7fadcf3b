//! Object-graph walking for the solution and for-each resolvers
//!
//! Types describe themselves as dotted-path leaves through `Walkable`.
//! The `Walker` keeps the current path, records every reported value whose
//! path matches a pending key, and refuses to descend past a depth guard.
//!
//! Path segments:
//! - object fields → `.name`
//! - dictionary entries → `[key]`
//! - list elements → `[index]`, with the whole list also reported at the
//!   parent path so both `items` and `items[0].name` resolve

use std::collections::{BTreeMap, HashMap};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::value::Value;

/// Capability to describe self as path-addressable values
pub trait Walkable {
    fn walk(&self, walker: &mut Walker<'_>);
}

#[derive(Debug, Clone)]
pub enum Segment<'s> {
    Field(&'s str),
    Entry(&'s str),
    Index(usize),
}

pub struct Walker<'p> {
    pending: &'p FxHashSet<String>,
    max_depth: usize,
    path: String,
    depth: usize,
    found: FxHashMap<String, Value>,
}

impl<'p> Walker<'p> {
    /// `pending` holds lower-cased paths relative to the walked root
    pub fn new(pending: &'p FxHashSet<String>, max_depth: usize) -> Self {
        Self {
            pending,
            max_depth,
            path: String::new(),
            depth: 0,
            found: FxHashMap::default(),
        }
    }

    /// Walk `root` and return every pending path it produced
    pub fn collect(
        root: &dyn Walkable,
        pending: &FxHashSet<String>,
        max_depth: usize,
    ) -> FxHashMap<String, Value> {
        if pending.is_empty() {
            return FxHashMap::default();
        }
        let mut walker = Walker::new(pending, max_depth);
        root.walk(&mut walker);
        walker.found
    }

    /// Current path (as built from segments)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Report the value at the current path
    pub fn report(&mut self, value: Value) {
        if self.path.is_empty() {
            return;
        }
        let key = self.path.to_lowercase();
        if self.pending.contains(&key) {
            self.found.entry(key).or_insert(value);
        }
    }

    fn wanted(&self, prefix: &str) -> bool {
        self.pending.iter().any(|p| p.starts_with(prefix))
    }

    /// Descend into a child under `segment`
    pub fn descend(&mut self, segment: Segment<'_>, child: &dyn Walkable) {
        if self.depth >= self.max_depth {
            debug!(path = %self.path, depth = self.depth, "walk depth guard reached");
            return;
        }

        let saved_len = self.path.len();
        match segment {
            Segment::Field(name) => {
                if !self.path.is_empty() {
                    self.path.push('.');
                }
                self.path.push_str(name);
            }
            Segment::Entry(key) => {
                self.path.push('[');
                self.path.push_str(key);
                self.path.push(']');
            }
            Segment::Index(i) => {
                self.path.push('[');
                self.path.push_str(&i.to_string());
                self.path.push(']');
            }
        }

        if self.wanted(&self.path.to_lowercase()) {
            self.depth += 1;
            child.walk(self);
            self.depth -= 1;
        }
        self.path.truncate(saved_len);
    }

    pub fn field(&mut self, name: &str, child: &dyn Walkable) {
        self.descend(Segment::Field(name), child);
    }

    pub fn entry(&mut self, key: &str, child: &dyn Walkable) {
        self.descend(Segment::Entry(key), child);
    }

    pub fn index(&mut self, i: usize, child: &dyn Walkable) {
        self.descend(Segment::Index(i), child);
    }

    /// Leaf field shorthand: `.name = value`
    pub fn leaf(&mut self, name: &str, value: Value) {
        self.field(name, &value);
    }

    /// List field: the whole collection at `.name`, then `.name[i]` per element
    pub fn list<T>(&mut self, name: &str, items: &[T])
    where
        T: Walkable + Into<Value> + Clone,
    {
        let whole = Value::List(items.iter().cloned().map(Into::into).collect());
        self.field(name, &whole);
    }
}

impl Walkable for Value {
    fn walk(&self, walker: &mut Walker<'_>) {
        match self {
            Value::List(items) => {
                walker.report(self.clone());
                for (i, item) in items.iter().enumerate() {
                    walker.index(i, item);
                }
            }
            Value::Map(map) => {
                walker.report(self.clone());
                for (k, v) in map {
                    walker.field(k, v);
                }
            }
            Value::Json(json) => json.walk(walker),
            Value::Null => {}
            other => walker.report(other.clone()),
        }
    }
}

impl Walkable for serde_json::Value {
    fn walk(&self, walker: &mut Walker<'_>) {
        match self {
            serde_json::Value::Array(items) => {
                walker.report(Value::from(self.clone()));
                for (i, item) in items.iter().enumerate() {
                    walker.index(i, item);
                }
            }
            serde_json::Value::Object(map) => {
                walker.report(Value::from(self.clone()));
                for (k, v) in map {
                    walker.field(k, v);
                }
            }
            serde_json::Value::Null => {}
            other => walker.report(Value::from(other.clone())),
        }
    }
}

impl<T: Walkable> Walkable for Vec<T> {
    fn walk(&self, walker: &mut Walker<'_>) {
        for (i, item) in self.iter().enumerate() {
            walker.index(i, item);
        }
    }
}

impl<T: Walkable> Walkable for BTreeMap<String, T> {
    fn walk(&self, walker: &mut Walker<'_>) {
        for (k, v) in self {
            walker.entry(k, v);
        }
    }
}

impl<T: Walkable> Walkable for HashMap<String, T> {
    fn walk(&self, walker: &mut Walker<'_>) {
        for (k, v) in self {
            walker.entry(k, v);
        }
    }
}

impl Walkable for String {
    fn walk(&self, walker: &mut Walker<'_>) {
        walker.report(Value::String(self.clone()));
    }
}
