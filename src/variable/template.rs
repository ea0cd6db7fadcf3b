//! Reference Grammar - `${{ namespace.path }}` recognition and substitution
//!
//! Grammar: `${{ WS* <namespace>.<dotted-path> WS* }}` where the namespace
//! is one of a closed set. Substitution is iterative: every resolvable
//! reference in a pass is replaced, and passes repeat while the text keeps
//! changing (a replacement can expose new references). A pass that changes
//! nothing, or an exhausted pass budget, ends resolution and whatever
//! references remain are reported unresolved.
//!
//! Two modes:
//! - `Mode::Input`: unresolved references stay literally in place. A
//!   complex value binds only when the reference is the entire text.
//! - `Mode::Condition`: unresolved → `NULL`, complex → `NOT-NULL`, so the
//!   expression stays evaluable.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::util::{MAX_SUBSTITUTION_PASSES, REFERENCE_CACHE_CAPACITY};

use super::value::Value;

/// Pre-compiled reference pattern (namespace is case-insensitive)
static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\$\{\{\s*((?i:vars|solution|steps|server|env|runner|cache|secrets|foreach))\.([^\s}]+)\s*\}\}",
    )
    .expect("reference regex is valid")
});

/// Parsed references per distinct workflow text (cleared when full)
static REFERENCE_CACHE: Lazy<DashMap<String, Arc<Vec<Reference>>>> = Lazy::new(DashMap::new);

/// Token substituted for unresolved references in conditions
pub const NULL_TOKEN: &str = "NULL";

/// Token substituted for resolved complex values in conditions
pub const NOT_NULL_TOKEN: &str = "NOT-NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Vars,
    Solution,
    Steps,
    Server,
    Env,
    Runner,
    Cache,
    Secrets,
    ForEach,
}

impl Namespace {
    pub const ALL: [Namespace; 9] = [
        Namespace::Vars,
        Namespace::Solution,
        Namespace::Steps,
        Namespace::Server,
        Namespace::Env,
        Namespace::Runner,
        Namespace::Cache,
        Namespace::Secrets,
        Namespace::ForEach,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Vars => "vars",
            Namespace::Solution => "solution",
            Namespace::Steps => "steps",
            Namespace::Server => "server",
            Namespace::Env => "env",
            Namespace::Runner => "runner",
            Namespace::Cache => "cache",
            Namespace::Secrets => "secrets",
            Namespace::ForEach => "foreach",
        }
    }

    /// Values under these namespaces are masked in display text
    pub fn is_secret(&self) -> bool {
        matches!(self, Namespace::Secrets | Namespace::Server)
    }

    /// Namespace of a dotted path (`steps.a.outputs.b` → `Steps`)
    pub fn of_path(path: &str) -> Option<Namespace> {
        path.split('.').next().and_then(|ns| ns.parse().ok())
    }
}

impl FromStr for Namespace {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `${{ ... }}` occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub namespace: Namespace,
    /// Path below the namespace as written (`myStep.outputs.foo`)
    pub key: String,
    /// Full dotted path as written (`steps.myStep.outputs.foo`)
    pub path: String,
}

impl Reference {
    /// Case-insensitive identity used as the store key
    pub fn normalized(&self) -> String {
        self.path.to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Input,
    Condition,
}

/// Result of substituting one piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct Substituted {
    /// `Value::String` for text, or the bound complex value
    pub value: Value,
    /// Paths still referenced after the last pass
    pub unresolved: Vec<String>,
}

impl Substituted {
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Extract all references in a text (cached per distinct text)
pub fn references(text: &str) -> Arc<Vec<Reference>> {
    if let Some(cached) = REFERENCE_CACHE.get(text) {
        return Arc::clone(&cached);
    }

    let refs = Arc::new(scan(text));
    if REFERENCE_CACHE.len() >= REFERENCE_CACHE_CAPACITY {
        REFERENCE_CACHE.clear();
    }
    REFERENCE_CACHE.insert(text.to_string(), Arc::clone(&refs));
    refs
}

/// Uncached extraction, used for intermediate substitution texts
fn scan(text: &str) -> Vec<Reference> {
    REFERENCE_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let namespace = cap[1].parse().ok()?;
            let key = cap[2].to_string();
            Some(Reference {
                namespace,
                path: format!("{}.{}", &cap[1], key),
                key,
            })
        })
        .collect()
}

/// Whether a text still carries any reference
pub fn contains_reference(text: &str) -> bool {
    text.contains("${{") && REFERENCE_RE.is_match(text)
}

/// The reference if it spans the whole text, nothing around it
pub fn sole_reference(text: &str) -> Option<Reference> {
    let cap = REFERENCE_RE.captures(text)?;
    let m = cap.get(0)?;
    if m.start() != 0 || m.end() != text.len() {
        return None;
    }
    let namespace = cap[1].parse().ok()?;
    Some(Reference {
        namespace,
        path: format!("{}.{}", &cap[1], &cap[2]),
        key: cap[2].to_string(),
    })
}

/// Substitute references in `text` using `lookup`
///
/// `lookup` receives the full dotted path as written and returns the
/// resolved value, or `None` when the variable is unresolved.
pub fn substitute<F>(text: &str, mode: Mode, lookup: F) -> Substituted
where
    F: Fn(&str) -> Option<Value>,
{
    let mut current = text.to_string();

    for _ in 0..MAX_SUBSTITUTION_PASSES {
        if !contains_reference(&current) {
            break;
        }

        if mode == Mode::Input {
            if let Some(sole) = sole_reference(&current) {
                if let Some(value) = lookup(&sole.path).filter(Value::is_complex) {
                    return Substituted {
                        value,
                        unresolved: Vec::new(),
                    };
                }
            }
        }

        let next = substitute_pass(&current, mode, &lookup);
        if next == current {
            break;
        }
        current = next;
    }

    let unresolved = scan(&current).into_iter().map(|r| r.path).collect();

    Substituted {
        value: Value::String(current),
        unresolved,
    }
}

/// One left-to-right pass; each match is looked up independently
fn substitute_pass<F>(text: &str, mode: Mode, lookup: &F) -> String
where
    F: Fn(&str) -> Option<Value>,
{
    let mut result = String::with_capacity(text.len() + 32);
    let mut last_end = 0;

    for cap in REFERENCE_RE.captures_iter(text) {
        let Some(m) = cap.get(0) else { continue };
        let path = format!("{}.{}", &cap[1], &cap[2]);
        result.push_str(&text[last_end..m.start()]);

        let resolved = lookup(&path).filter(|v| !v.is_null());
        let replacement = match (mode, resolved) {
            (_, Some(v)) if v.is_simple() => v.to_display_string(),
            (Mode::Condition, Some(_)) => NOT_NULL_TOKEN.to_string(),
            (Mode::Condition, None) => NULL_TOKEN.to_string(),
            (Mode::Input, Some(v @ (Value::List(_) | Value::Map(_)))) => v.to_display_string(),
            (Mode::Input, _) => m.as_str().to_string(),
        };

        result.push_str(&replacement);
        last_end = m.end();
    }

    result.push_str(&text[last_end..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn lookup_from(pairs: &[(&str, Value)]) -> impl Fn(&str) -> Option<Value> {
        let map: FxHashMap<String, Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();
        move |path: &str| map.get(&path.to_lowercase()).cloned()
    }

    #[test]
    fn extracts_namespaced_references() {
        let refs = references("a ${{ vars.name }} b ${{steps.build.outputs.id}} c ${{ nope.x }}");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].namespace, Namespace::Vars);
        assert_eq!(refs[0].key, "name");
        assert_eq!(refs[1].path, "steps.build.outputs.id");
    }

    #[test]
    fn namespace_is_case_insensitive() {
        let refs = references("${{ SOLUTION.Items[0].name }}");
        assert_eq!(refs[0].namespace, Namespace::Solution);
        assert_eq!(refs[0].normalized(), "solution.items[0].name");
    }

    #[test]
    fn substitutes_simple_value() {
        let lookup = lookup_from(&[("vars.name", Value::from("World"))]);
        let out = substitute("Hello, ${{ vars.name }}", Mode::Input, lookup);
        assert_eq!(out.value, Value::from("Hello, World"));
        assert!(out.is_resolved());
    }

    #[test]
    fn unresolved_input_stays_literal() {
        let lookup = lookup_from(&[]);
        let out = substitute("x=${{ vars.missing }}", Mode::Input, lookup);
        assert_eq!(out.value, Value::from("x=${{ vars.missing }}"));
        assert_eq!(out.unresolved, vec!["vars.missing".to_string()]);
    }

    #[test]
    fn unresolved_reference_does_not_block_others() {
        let lookup = lookup_from(&[("vars.b", Value::Int(2))]);
        let out = substitute("${{ vars.a }}-${{ vars.b }}", Mode::Input, lookup);
        assert_eq!(out.value, Value::from("${{ vars.a }}-2"));
        assert_eq!(out.unresolved, vec!["vars.a".to_string()]);
    }

    #[test]
    fn sole_complex_reference_binds_whole_value() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let lookup = lookup_from(&[("solution.items", list.clone())]);
        let out = substitute("${{ solution.items }}", Mode::Input, lookup);
        assert_eq!(out.value, list);
    }

    #[test]
    fn embedded_list_renders_as_json() {
        let lookup = lookup_from(&[("vars.ids", Value::List(vec![Value::Int(1)]))]);
        let out = substitute("ids: ${{ vars.ids }}", Mode::Input, lookup);
        assert_eq!(out.value, Value::from("ids: [1]"));
    }

    #[test]
    fn embedded_handle_stays_unresolved() {
        let handle = Value::Handle(crate::variable::Handle::new(1u8));
        let lookup = lookup_from(&[("steps.c.outputs.client", handle)]);
        let out = substitute("use ${{ steps.c.outputs.client }}", Mode::Input, lookup);
        assert_eq!(out.unresolved.len(), 1);
    }

    #[test]
    fn nested_references_resolve_iteratively() {
        let lookup = lookup_from(&[
            ("vars.greeting", Value::from("Hi ${{ vars.name }}")),
            ("vars.name", Value::from("Ada")),
        ]);
        let out = substitute("${{ vars.greeting }}!", Mode::Input, lookup);
        assert_eq!(out.value, Value::from("Hi Ada!"));
    }

    #[test]
    fn self_reference_terminates_unresolved() {
        let lookup = lookup_from(&[("vars.loop", Value::from("x${{ vars.loop }}"))]);
        let out = substitute("${{ vars.loop }}", Mode::Input, lookup);
        assert_eq!(out.unresolved, vec!["vars.loop".to_string()]);
    }

    #[test]
    fn condition_mode_injects_null_tokens() {
        let lookup = lookup_from(&[("vars.list", Value::List(vec![]))]);
        let out = substitute(
            "${{ vars.flag }} == true && ${{ vars.list }} != NULL",
            Mode::Condition,
            lookup,
        );
        assert_eq!(out.value, Value::from("NULL == true && NOT-NULL != NULL"));
        assert!(out.is_resolved());
    }

    #[test]
    fn resolution_is_idempotent() {
        let lookup = lookup_from(&[("vars.name", Value::from("World"))]);
        let once = substitute("Hello ${{ vars.name }}", Mode::Input, &lookup);
        let text = once.value.to_display_string();
        let twice = substitute(&text, Mode::Input, &lookup);
        assert_eq!(once.value, twice.value);
    }

    #[test]
    fn order_of_references_does_not_matter() {
        let lookup = lookup_from(&[("vars.a", Value::from("A")), ("vars.b", Value::from("B"))]);
        let ab = substitute("${{ vars.a }}${{ vars.b }}", Mode::Input, &lookup);
        let ba = substitute("${{ vars.b }}${{ vars.a }}", Mode::Input, &lookup);
        assert_eq!(ab.value, Value::from("AB"));
        assert_eq!(ba.value, Value::from("BA"));
    }

    #[test]
    fn intermediate_texts_are_not_cached() {
        let lookup = lookup_from(&[
            ("vars.outer_cache_check", Value::from("x ${{ vars.inner_cache_check }}")),
            ("vars.inner_cache_check", Value::from("y")),
        ]);
        let out = substitute("${{ vars.outer_cache_check }}", Mode::Input, lookup);
        assert_eq!(out.value, Value::from("x y"));
        assert!(!REFERENCE_CACHE.contains_key("x ${{ vars.inner_cache_check }}"));
        assert!(!REFERENCE_CACHE.contains_key("x y"));
    }

    #[test]
    fn reference_cache_is_bounded() {
        let first = "${{ vars.bounded_0 }}";
        references(first);
        for i in 1..=REFERENCE_CACHE_CAPACITY {
            references(&format!("${{{{ vars.bounded_{} }}}}", i));
        }
        assert!(!REFERENCE_CACHE.contains_key(first));
    }
}
