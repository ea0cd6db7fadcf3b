//! ServerVariableProvider - resolution for steps run on the task server
//!
//! Keeps a flat list of `{short_name, full_name, value}` records because the
//! task protocol names variables both ways (`token` / `inputs.token`,
//! `deployKey` / `server.deployKey`). Only runner and server-side secret
//! resolution happen here, followed by one substitution over the inputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::ast::Action;
use crate::resolver::{NamespaceResolver, RunnerResolver, SecretResolver, SecretsResolver};
use crate::variable::{mask, references, substitute, Mode, Namespace, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerVariable {
    pub short_name: String,
    pub full_name: String,
    pub value: Option<Value>,
    pub is_secret: bool,
}

impl ServerVariable {
    fn new(short_name: impl Into<String>, full_name: impl Into<String>, value: Option<Value>) -> Self {
        let full_name = full_name.into();
        let is_secret = Namespace::of_path(&full_name).is_some_and(|ns| ns.is_secret());
        Self {
            short_name: short_name.into(),
            full_name,
            value,
            is_secret,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_null())
    }

    /// Value as safe to show in logs
    pub fn display_value(&self) -> String {
        let text = self
            .value
            .as_ref()
            .map(Value::to_display_string)
            .unwrap_or_default();
        if self.is_secret {
            mask(&text)
        } else {
            text
        }
    }
}

pub struct ServerVariableProvider {
    variables: Vec<ServerVariable>,
    runner: RunnerResolver,
    server_secrets: Option<SecretsResolver>,
    org_secrets: Option<SecretsResolver>,
}

impl ServerVariableProvider {
    pub fn new(runner: RunnerResolver) -> Self {
        Self {
            variables: Vec::new(),
            runner,
            server_secrets: None,
            org_secrets: None,
        }
    }

    /// Backend for `server.*` and `secrets.*` references
    pub fn with_secrets(mut self, backend: Arc<dyn SecretResolver>) -> Self {
        self.server_secrets = Some(SecretsResolver::new(Namespace::Server, Arc::clone(&backend)));
        self.org_secrets = Some(SecretsResolver::new(Namespace::Secrets, backend));
        self
    }

    pub fn variables(&self) -> &[ServerVariable] {
        &self.variables
    }

    fn find(&self, full_name: &str) -> Option<&ServerVariable> {
        self.variables
            .iter()
            .find(|v| v.full_name.eq_ignore_ascii_case(full_name))
    }

    fn upsert(&mut self, variable: ServerVariable) {
        match self
            .variables
            .iter_mut()
            .find(|v| v.full_name.eq_ignore_ascii_case(&variable.full_name))
        {
            Some(existing) if variable.is_resolved() || !existing.is_resolved() => {
                existing.value = variable.value;
            }
            Some(_) => {}
            None => self.variables.push(variable),
        }
    }

    /// Seed, resolve and substitute the step's inputs in place
    #[instrument(skip_all, fields(step = %action.id))]
    pub async fn resolve_inputs(&mut self, action: &mut Action) {
        for (id, input) in &action.inputs {
            let value = input.default.clone().normalize();
            for text in value.strings() {
                for reference in references(text).iter() {
                    self.upsert(ServerVariable::new(&reference.key, &reference.path, None));
                }
            }
            self.upsert(ServerVariable::new(id, format!("inputs.{}", id), Some(value)));
        }

        self.resolve_namespace(&self.runner.clone()).await;
        if let Some(server) = self.server_secrets.take() {
            self.resolve_namespace(&server).await;
            self.server_secrets = Some(server);
        }
        if let Some(org) = self.org_secrets.take() {
            self.resolve_namespace(&org).await;
            self.org_secrets = Some(org);
        }

        for input in action.inputs.values_mut() {
            input.default = self.substitute_value(&input.default.clone().normalize());
        }
        for (id, input) in &action.inputs {
            self.upsert(ServerVariable::new(
                id,
                format!("inputs.{}", id),
                Some(input.default.clone()),
            ));
        }
    }

    async fn resolve_namespace(&mut self, resolver: &dyn NamespaceResolver) {
        let namespace = resolver.namespace();
        let pending: Vec<String> = self
            .variables
            .iter()
            .filter(|v| !v.is_resolved() && Namespace::of_path(&v.full_name) == Some(namespace))
            .map(|v| v.short_name.to_lowercase())
            .collect();
        if pending.is_empty() {
            return;
        }

        let found = resolver.resolve(&pending).await;
        debug!(namespace = %namespace, pending = pending.len(), resolved = found.len(), "server namespace resolved");
        for variable in &mut self.variables {
            if Namespace::of_path(&variable.full_name) != Some(namespace) {
                continue;
            }
            if let Some(value) = found.get(&variable.short_name.to_lowercase()) {
                variable.value = Some(value.clone());
            }
        }
    }

    fn substitute_value(&self, value: &Value) -> Value {
        let lookup = |path: &str| self.find(path).and_then(|v| v.value.clone());
        match value {
            Value::String(text) => substitute(text, Mode::Input, lookup).value,
            Value::List(items) => Value::List(items.iter().map(|v| self.substitute_value(v)).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Input values by short name
    pub fn get_inputs(&self) -> BTreeMap<String, Value> {
        self.variables
            .iter()
            .filter(|v| v.full_name.starts_with("inputs."))
            .filter_map(|v| v.value.clone().map(|value| (v.short_name.clone(), value)))
            .collect()
    }

    /// References still present in the inputs after resolution
    pub fn get_unresolved_variables(&self) -> Vec<String> {
        let mut unresolved: Vec<String> = self
            .get_inputs()
            .values()
            .flat_map(|value| {
                value
                    .strings()
                    .into_iter()
                    .flat_map(|text| references(text).iter().map(|r| r.path.clone()).collect::<Vec<_>>())
                    .collect::<Vec<_>>()
            })
            .collect();
        unresolved.sort();
        unresolved.dedup();
        unresolved
    }

    /// Record step outputs as `steps.<id>.outputs.<name>`
    pub fn save_outputs(&mut self, action_id: &str, outputs: &BTreeMap<String, Value>) {
        for (name, value) in outputs {
            self.upsert(ServerVariable::new(
                name,
                format!("steps.{}.outputs.{}", action_id, name),
                Some(value.clone().normalize()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticSecretResolver;

    fn provider() -> ServerVariableProvider {
        let backend = StaticSecretResolver::new()
            .with("deploykey", "k-999")
            .with("dbpassword", "pw");
        ServerVariableProvider::new(RunnerResolver::offline().with_execution_dir("/srv"))
            .with_secrets(Arc::new(backend))
    }

    #[tokio::test]
    async fn resolves_runner_and_server_secrets() {
        let mut action = Action::new("deploy", "core/echo@v1")
            .with_input("key", "${{ server.deployKey }}")
            .with_input("db", "${{ secrets.dbPassword }}")
            .with_input("dir", "run in ${{ runner.executionDirectory }}");

        let mut provider = provider();
        provider.resolve_inputs(&mut action).await;

        let inputs = provider.get_inputs();
        assert_eq!(inputs["key"], Value::from("k-999"));
        assert_eq!(inputs["db"], Value::from("pw"));
        assert_eq!(inputs["dir"], Value::from("run in /srv"));
        assert_eq!(action.inputs["key"].default, Value::from("k-999"));
        assert!(provider.get_unresolved_variables().is_empty());
    }

    #[tokio::test]
    async fn records_carry_short_and_full_names() {
        let mut action = Action::new("deploy", "core/echo@v1").with_input("key", "${{ server.deployKey }}");
        let mut provider = provider();
        provider.resolve_inputs(&mut action).await;

        let secret = provider
            .variables()
            .iter()
            .find(|v| v.full_name == "server.deployKey")
            .unwrap();
        assert_eq!(secret.short_name, "deployKey");
        assert!(secret.is_secret);
        assert_eq!(secret.display_value(), "*****");
    }

    #[tokio::test]
    async fn unknown_references_are_reported() {
        let mut action = Action::new("a", "core/echo@v1").with_input("x", "${{ server.missing }}");
        let mut provider = provider();
        provider.resolve_inputs(&mut action).await;
        assert_eq!(provider.get_unresolved_variables(), vec!["server.missing".to_string()]);
    }

    #[test]
    fn outputs_are_saved_under_step_path() {
        let mut provider = provider();
        let outputs = BTreeMap::from([("url".to_string(), Value::from("https://app"))]);
        provider.save_outputs("deploy", &outputs);
        assert_eq!(
            provider.find("STEPS.deploy.outputs.URL").and_then(|v| v.value.clone()),
            Some(Value::from("https://app"))
        );
    }
}
