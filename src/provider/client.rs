//! ClientVariableProvider - local resolution of workflow variables
//!
//! Lifecycle:
//! 1. `initialize` scans the canonical workflow text and seeds every
//!    distinct reference as unresolved, then binds the `vars:` block.
//! 2. `resolve_all` runs runner → solution → environment → cache, in that
//!    fixed order.
//! 3. Per step, `get_input_variables` rewrites the step's inputs in place
//!    and `get_unresolved_input_variables` reports what is still missing.
//! 4. `store_output_variables` publishes `steps.<id>.outputs.<name>` and
//!    re-renders the step's own display text.
//!
//! Secrets are fetched lazily, only for the steps that reference them.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::ast::{Action, DisplayMessages, Job, Workflow};
use crate::config::NoxConfig;
use crate::error::Result;
use crate::resolver::{
    CacheResolver, EnvironmentResolver, NamespaceResolver, RunnerResolver, SecretResolver,
    SecretsResolver, SolutionResolver,
};
use crate::variable::{
    mask_secret_references, mask_secret_values, references, substitute, Mode, Namespace, Value,
    VariableStore, Walkable,
};

/// Inputs of a step that still carry references after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedInput {
    pub input: String,
    pub references: Vec<String>,
}

impl UnresolvedInput {
    /// `input (ref, ref)` for diagnostics
    pub fn describe(&self) -> String {
        format!("{} ({})", self.input, self.references.join(", "))
    }
}

pub struct ClientVariableProvider {
    store: VariableStore,
    runner: Box<dyn NamespaceResolver>,
    solution: Option<Box<dyn NamespaceResolver>>,
    environment: Box<dyn NamespaceResolver>,
    cache: Option<Box<dyn NamespaceResolver>>,
    secrets: Option<Box<dyn NamespaceResolver>>,
    max_walk_depth: usize,
}

impl ClientVariableProvider {
    pub fn new(config: &NoxConfig) -> Self {
        Self {
            store: VariableStore::new(),
            runner: Box::new(RunnerResolver::new(config)),
            solution: None,
            environment: Box::new(EnvironmentResolver::new()),
            cache: None,
            secrets: None,
            max_walk_depth: config.max_walk_depth,
        }
    }

    /// No network probes; used by tests and `nox validate`
    pub fn offline() -> Self {
        Self {
            runner: Box::new(RunnerResolver::offline()),
            ..Self::new(&NoxConfig::default())
        }
    }

    pub fn with_runner(mut self, runner: RunnerResolver) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn with_solution(mut self, solution: Arc<dyn Walkable + Send + Sync>) -> Self {
        self.solution = Some(Box::new(
            SolutionResolver::new(solution).with_max_depth(self.max_walk_depth),
        ));
        self
    }

    pub fn with_cache(mut self, cache: CacheResolver) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    pub fn with_secrets(mut self, backend: Arc<dyn SecretResolver>) -> Self {
        self.secrets = Some(Box::new(SecretsResolver::new(Namespace::Secrets, backend)));
        self
    }

    pub fn max_walk_depth(&self) -> usize {
        self.max_walk_depth
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut VariableStore {
        &mut self.store
    }

    /// Resolved value of a dotted path (case-insensitive)
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.store.get(path)
    }

    /// Set a variable directly (`vars.*` from the command line, tests)
    pub fn set_variable(&mut self, path: &str, value: impl Into<Value>) {
        self.store.set(path, value.into());
    }

    // ═══════════════════════════════════════════════════════════════
    // Workflow-level resolution
    // ═══════════════════════════════════════════════════════════════

    /// Seed the store from the workflow's canonical text
    #[instrument(skip_all, fields(workflow = %workflow.name))]
    pub fn initialize(&mut self, workflow: &Workflow) -> Result<()> {
        let text = workflow.canonical_text()?;
        let refs = references(&text);
        for reference in refs.iter() {
            self.store.insert_unresolved(&reference.path);
        }
        for (name, value) in &workflow.vars {
            self.store.set(&format!("vars.{}", name), value.clone());
        }
        debug!(references = refs.len(), vars = workflow.vars.len(), "variables seeded");
        Ok(())
    }

    /// Runner, solution, environment, cache (fixed order)
    #[instrument(skip_all)]
    pub async fn resolve_all(&mut self) {
        resolve_namespace(&mut self.store, self.runner.as_ref()).await;
        if let Some(solution) = &self.solution {
            resolve_namespace(&mut self.store, solution.as_ref()).await;
        }
        resolve_namespace(&mut self.store, self.environment.as_ref()).await;
        if let Some(cache) = &self.cache {
            resolve_namespace(&mut self.store, cache.as_ref()).await;
            if let Some(token) = self.store.get("cache.accesstoken").cloned() {
                self.store.set_secret("cache.accesstoken", token);
            }
        }
    }

    /// Resolve pending keys of one namespace (for-each element, ad-hoc resolvers)
    pub async fn resolve_with(&mut self, resolver: &dyn NamespaceResolver) {
        resolve_namespace(&mut self.store, resolver).await;
    }

    /// Fetch the secrets a piece of text refers to
    async fn fetch_secrets<'t>(&mut self, texts: impl IntoIterator<Item = &'t str>) {
        let Some(secrets) = &self.secrets else {
            return;
        };
        let mut wanted = false;
        for text in texts {
            for reference in references(text).iter() {
                if reference.namespace == Namespace::Secrets {
                    self.store.insert_unresolved(&reference.path);
                    wanted |= !self.store.is_resolved(&reference.path);
                }
            }
        }
        if wanted {
            resolve_namespace(&mut self.store, secrets.as_ref()).await;
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Substitution
    // ═══════════════════════════════════════════════════════════════

    fn lookup(&self) -> impl Fn(&str) -> Option<Value> + '_ {
        |path: &str| self.store.get(path).cloned()
    }

    /// Substitute every string leaf of a value (lists and maps included)
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => substitute(text, Mode::Input, self.lookup()).value,
            Value::List(items) => Value::List(items.iter().map(|v| self.resolve_value(v)).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Text with every reference substituted (unresolved ones stay literal)
    pub fn resolve_text(&self, text: &str) -> String {
        substitute(text, Mode::Input, self.lookup())
            .value
            .to_display_string()
    }

    /// `if`-condition text: unresolved → `NULL`, complex → `NOT-NULL`
    pub fn condition_text(&self, expression: &str) -> String {
        substitute(expression, Mode::Condition, self.lookup())
            .value
            .to_display_string()
    }

    /// Display text with secrets masked before and after substitution
    pub fn render_display(&self, text: &str) -> String {
        let masked = mask_secret_references(text, &self.store);
        let substituted = self.resolve_text(&masked);
        mask_secret_values(&substituted, &self.store)
    }

    pub fn render_messages(&self, display: &DisplayMessages) -> DisplayMessages {
        DisplayMessages {
            success: display.success.as_deref().map(|t| self.render_display(t)),
            error: display.error.as_deref().map(|t| self.render_display(t)),
            if_condition: display.if_condition.as_deref().map(|t| self.render_display(t)),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Step-level operations
    // ═══════════════════════════════════════════════════════════════

    /// Rewrite the step's inputs in place and return the concrete map
    #[instrument(skip_all, fields(step = %action.id))]
    pub async fn get_input_variables(&mut self, action: &mut Action) -> BTreeMap<String, Value> {
        let texts: Vec<String> = action
            .inputs
            .values()
            .flat_map(|input| input.default.strings().into_iter().map(str::to_string))
            .collect();
        self.fetch_secrets(texts.iter().map(String::as_str)).await;

        for input in action.inputs.values_mut() {
            input.default = self.resolve_value(&input.default);
        }
        action.input_values()
    }

    /// Inputs still holding a reference
    ///
    /// `server.*` references of run-at-server steps are left to the server.
    pub fn get_unresolved_input_variables(&self, action: &Action) -> Vec<UnresolvedInput> {
        action
            .inputs
            .iter()
            .filter_map(|(name, input)| {
                let mut refs: Vec<String> = input
                    .default
                    .strings()
                    .into_iter()
                    .flat_map(|text| {
                        references(text)
                            .iter()
                            .filter(|r| !(action.run_at_server && r.namespace == Namespace::Server))
                            .map(|r| r.path.clone())
                            .collect::<Vec<_>>()
                    })
                    .collect();
                refs.dedup();
                (!refs.is_empty()).then(|| UnresolvedInput {
                    input: name.clone(),
                    references: refs,
                })
            })
            .collect()
    }

    /// Publish outputs as `steps.<id>.outputs.<name>` and refresh display text
    pub fn store_output_variables(&mut self, action: &mut Action, outputs: &BTreeMap<String, Value>) {
        for (name, value) in outputs {
            let path = format!("steps.{}.outputs.{}", action.id, name);
            self.store.set(&path, value.clone().normalize());
        }
        action.display = self.render_messages(&action.display);
    }

    /// Substitute a job's `for-each` and display text
    ///
    /// The `if` text is left as written; `condition_text` substitutes it
    /// at evaluation time so complex values become `NOT-NULL`.
    pub async fn resolve_job_variables(&mut self, job: &mut Job) {
        let mut texts: Vec<String> = job.if_condition.iter().cloned().collect();
        if let Some(for_each) = &job.for_each {
            texts.extend(for_each.strings().into_iter().map(str::to_string));
        }
        self.fetch_secrets(texts.iter().map(String::as_str)).await;

        if let Some(for_each) = &job.for_each {
            job.for_each = Some(self.resolve_value(for_each));
        }
        job.display = self.render_messages(&job.display);
    }
}

/// Feed one resolver's answers into the store
async fn resolve_namespace(store: &mut VariableStore, resolver: &dyn NamespaceResolver) {
    let namespace = resolver.namespace();
    let pending = store.pending(namespace);
    if pending.is_empty() {
        return;
    }

    let found = resolver.resolve(&pending).await;
    debug!(namespace = %namespace, pending = pending.len(), resolved = found.len(), "namespace resolved");
    for (key, value) in found {
        store.set(&format!("{}.{}", namespace, key), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticSecretResolver;
    use serde_json::json;

    fn workflow(yaml: &str) -> Workflow {
        Workflow::from_yaml(yaml).unwrap()
    }

    const GREETING: &str = r#"
name: greet
vars:
  name: World
jobs:
  - id: main
    steps:
      - id: hello
        uses: core/echo@v1
        with:
          greeting: "Hello, ${{ vars.name }}"
          region: "${{ solution.region }}"
"#;

    #[tokio::test]
    async fn seeds_and_resolves_inputs() {
        let wf = workflow(GREETING);
        let mut provider =
            ClientVariableProvider::offline().with_solution(Arc::new(json!({"region": "weu"})));
        provider.initialize(&wf).unwrap();
        assert!(provider.store().contains("solution.region"));

        provider.resolve_all().await;
        let mut action = wf.jobs[0].steps[0].clone();
        let inputs = provider.get_input_variables(&mut action).await;

        assert_eq!(inputs["greeting"], Value::from("Hello, World"));
        assert_eq!(inputs["region"], Value::from("weu"));
        assert!(provider.get_unresolved_input_variables(&action).is_empty());
    }

    #[tokio::test]
    async fn second_resolution_is_a_no_op() {
        let wf = workflow(GREETING);
        let mut provider = ClientVariableProvider::offline();
        provider.initialize(&wf).unwrap();

        let mut action = wf.jobs[0].steps[0].clone();
        let first = provider.get_input_variables(&mut action).await;
        let second = provider.get_input_variables(&mut action).await;
        assert_eq!(first, second);
        assert_eq!(
            provider.get_unresolved_input_variables(&action),
            vec![UnresolvedInput {
                input: "region".into(),
                references: vec!["solution.region".into()],
            }]
        );
    }

    #[tokio::test]
    async fn outputs_are_case_insensitive() {
        let mut provider = ClientVariableProvider::offline();
        let mut action = Action::new("Login", "core/set-outputs@v1");
        let outputs = BTreeMap::from([("Token".to_string(), Value::Json(json!("abc123")))]);
        provider.store_output_variables(&mut action, &outputs);

        assert_eq!(provider.get("STEPS.login.OUTPUTS.token"), Some(&Value::from("abc123")));
    }

    #[tokio::test]
    async fn structured_json_outputs_are_unwrapped() {
        let mut provider = ClientVariableProvider::offline();
        let mut action = Action::new("q", "core/set-outputs@v1");
        let outputs = BTreeMap::from([
            ("rows".to_string(), Value::Json(json!([1, 2]))),
            ("empty".to_string(), Value::Json(json!(null))),
        ]);
        provider.store_output_variables(&mut action, &outputs);

        assert_eq!(
            provider.get("steps.q.outputs.rows"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert!(provider.get("steps.q.outputs.empty").is_none());
    }

    #[tokio::test]
    async fn secrets_are_fetched_lazily_and_masked() {
        let yaml = r#"
name: s
jobs:
  - id: j
    steps:
      - id: call
        uses: core/echo@v1
        with:
          key: "${{ secrets.apiKey }}"
        display:
          success: "called with ${{ secrets.apiKey }}"
"#;
        let wf = workflow(yaml);
        let backend = StaticSecretResolver::new().with("apikey", "super-secret-value");
        let mut provider = ClientVariableProvider::offline().with_secrets(Arc::new(backend));
        provider.initialize(&wf).unwrap();
        provider.resolve_all().await;
        assert!(!provider.store().is_resolved("secrets.apikey"));

        let mut action = wf.jobs[0].steps[0].clone();
        let inputs = provider.get_input_variables(&mut action).await;
        assert_eq!(inputs["key"], Value::from("super-secret-value"));

        provider.store_output_variables(&mut action, &BTreeMap::new());
        let shown = action.display.success.unwrap();
        assert_eq!(shown, format!("called with {}", "*".repeat(18)));
    }

    #[tokio::test]
    async fn condition_text_uses_null_tokens() {
        let mut provider = ClientVariableProvider::offline();
        provider.set_variable("vars.items", Value::List(vec![Value::Int(1)]));
        assert_eq!(
            provider.condition_text("${{ vars.flag }} == true"),
            "NULL == true"
        );
        assert_eq!(provider.condition_text("${{ vars.items }} != NULL"), "NOT-NULL != NULL");
    }

    #[tokio::test]
    async fn server_references_are_left_to_the_server() {
        let provider = ClientVariableProvider::offline();
        let mut action = Action::new("remote", "core/echo@v1")
            .with_input("token", "${{ server.deployToken }}");
        action.run_at_server = true;
        assert!(provider.get_unresolved_input_variables(&action).is_empty());

        action.run_at_server = false;
        assert_eq!(provider.get_unresolved_input_variables(&action).len(), 1);
    }

    #[tokio::test]
    async fn job_for_each_binds_whole_list() {
        let yaml = r#"
name: loop
jobs:
  - id: each
    for-each: "${{ solution.items }}"
    steps:
      - id: s
        uses: core/echo@v1
"#;
        let wf = workflow(yaml);
        let mut provider = ClientVariableProvider::offline()
            .with_solution(Arc::new(json!({"items": [{"id": 1}, {"id": 2}]})));
        provider.initialize(&wf).unwrap();
        provider.resolve_all().await;

        let mut job = wf.jobs[0].clone();
        provider.resolve_job_variables(&mut job).await;
        assert!(matches!(job.for_each, Some(Value::List(ref l)) if l.len() == 2));
    }

    #[tokio::test]
    async fn job_condition_keeps_complex_values_abstract() {
        let yaml = r#"
name: gated
vars:
  items: [1]
jobs:
  - id: main
    if: "${{ vars.items }} == NOT-NULL"
    steps:
      - id: s
        uses: core/echo@v1
"#;
        let wf = workflow(yaml);
        let mut provider = ClientVariableProvider::offline();
        provider.initialize(&wf).unwrap();
        provider.resolve_all().await;

        let mut job = wf.jobs[0].clone();
        provider.resolve_job_variables(&mut job).await;
        let condition = job.if_condition.clone().unwrap();
        assert_eq!(condition, "${{ vars.items }} == NOT-NULL");
        assert_eq!(provider.condition_text(&condition), "NOT-NULL == NOT-NULL");
    }
}
