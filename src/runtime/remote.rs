//! Remote task execution for `run-at-server` steps
//!
//! Wire format (JSON):
//! - `GET  {server}/health` → `{"name": "..."}`
//! - `POST {server}/tasks`  `{"workflowId", "action"}` →
//!   `{"state", "outputs", "errorMessage"}`
//!
//! The client checks health before every dispatch; an unreachable server
//! halts the workflow.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use crate::action::{ActionContext, ActionRegistry};
use crate::ast::{Action, ActionState};
use crate::error::{NoxError, Result};
use crate::provider::ServerVariableProvider;
use crate::resolver::{RunnerResolver, SecretResolver};
use crate::util::constants::CONNECT_TIMEOUT;
use crate::util::REMOTE_TIMEOUT;
use crate::variable::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthInfo {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub workflow_id: String,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub state: ActionState,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TaskOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: ActionState::Error,
            outputs: BTreeMap::new(),
            error_message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait RemoteTaskExecutor: Send + Sync {
    /// Liveness probe run before each dispatch
    async fn echo_health(&self) -> Result<HealthInfo>;

    async fn execute_task(&self, workflow_id: &str, action: &Action) -> Result<TaskOutcome>;
}

// ═══════════════════════════════════════════════════════════════
// HTTP client
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct HttpTaskClient {
    base: Url,
    client: reqwest::Client,
}

impl HttpTaskClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let normalized = format!("{}/", server_url.trim_end_matches('/'));
        let base = Url::parse(&normalized).map_err(|e| NoxError::ConfigError {
            reason: format!("Invalid server url '{}': {}", server_url, e),
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REMOTE_TIMEOUT)
            .build()
            .map_err(|e| NoxError::ConfigError {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| NoxError::ConfigError {
            reason: format!("Invalid endpoint '{}': {}", path, e),
        })
    }

    fn unreachable(&self, reason: impl ToString) -> NoxError {
        NoxError::ServerUnreachable {
            url: self.base.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl RemoteTaskExecutor for HttpTaskClient {
    async fn echo_health(&self) -> Result<HealthInfo> {
        let url = self.endpoint("health")?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        if !resp.status().is_success() {
            return Err(self.unreachable(format!("health check returned {}", resp.status())));
        }
        resp.json::<HealthInfo>()
            .await
            .map_err(|e| self.unreachable(e))
    }

    #[instrument(skip(self, action), fields(step = %action.id))]
    async fn execute_task(&self, workflow_id: &str, action: &Action) -> Result<TaskOutcome> {
        let url = self.endpoint("tasks")?;
        let request = TaskRequest {
            workflow_id: workflow_id.to_string(),
            action: action.clone(),
        };
        let resp = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| NoxError::RemoteTask {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NoxError::RemoteTask {
                reason: format!("server returned {}: {}", status, body),
            });
        }
        let outcome = resp
            .json::<TaskOutcome>()
            .await
            .map_err(|e| NoxError::RemoteTask {
                reason: format!("invalid task response: {}", e),
            })?;
        debug!(state = %outcome.state, outputs = outcome.outputs.len(), "remote task finished");
        Ok(outcome)
    }
}

// ═══════════════════════════════════════════════════════════════
// In-process server
// ═══════════════════════════════════════════════════════════════

/// Server side of the task protocol, run in-process
///
/// Resolves inputs with a [`ServerVariableProvider`] and invokes the
/// action through the registry with `is_server = true`.
pub struct InProcessTaskServer {
    name: String,
    registry: Arc<ActionRegistry>,
    runner: RunnerResolver,
    secrets: Option<Arc<dyn SecretResolver>>,
}

impl InProcessTaskServer {
    pub fn new(name: impl Into<String>, registry: Arc<ActionRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            runner: RunnerResolver::offline(),
            secrets: None,
        }
    }

    pub fn with_runner(mut self, runner: RunnerResolver) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretResolver>) -> Self {
        self.secrets = Some(secrets);
        self
    }
}

#[async_trait]
impl RemoteTaskExecutor for InProcessTaskServer {
    async fn echo_health(&self) -> Result<HealthInfo> {
        Ok(HealthInfo {
            name: self.name.clone(),
        })
    }

    #[instrument(skip(self, action), fields(step = %action.id))]
    async fn execute_task(&self, workflow_id: &str, action: &Action) -> Result<TaskOutcome> {
        let mut provider = ServerVariableProvider::new(self.runner.clone());
        if let Some(secrets) = &self.secrets {
            provider = provider.with_secrets(Arc::clone(secrets));
        }

        let mut action = action.clone();
        provider.resolve_inputs(&mut action).await;
        let unresolved = provider.get_unresolved_variables();
        if !unresolved.is_empty() {
            let err = NoxError::UnresolvedVariables {
                step_id: action.id.clone(),
                variables: unresolved,
            };
            return Ok(TaskOutcome::failed(err.to_string()));
        }

        info!(workflow_id, server = %self.name, "executing remote task");
        let mut ctx = ActionContext::new(&action.id, true, CancellationToken::new());
        match self
            .registry
            .invoke(&action.uses, provider.get_inputs(), &mut ctx)
            .await
        {
            Ok(outputs) => {
                provider.save_outputs(&action.id, &outputs);
                Ok(TaskOutcome {
                    state: ctx.state(),
                    outputs,
                    error_message: ctx.error_message().map(str::to_string),
                })
            }
            Err(e) => Ok(TaskOutcome::failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticSecretResolver;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_client_probes_and_dispatches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "tasks-1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .and(body_partial_json(json!({"workflowId": "wf-1", "action": {"id": "deploy"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "success",
                "outputs": {"url": "https://app"},
            })))
            .mount(&server)
            .await;

        let client = HttpTaskClient::new(&server.uri()).unwrap();
        assert_eq!(client.echo_health().await.unwrap().name, "tasks-1");

        let action = Action::new("deploy", "core/echo@v1");
        let outcome = client.execute_task("wf-1", &action).await.unwrap();
        assert_eq!(outcome.state, ActionState::Success);
        assert_eq!(outcome.outputs["url"], Value::from("https://app"));
        assert_eq!(outcome.error_message, None);
    }

    #[tokio::test]
    async fn unreachable_server_fails_health() {
        let client = HttpTaskClient::new("http://127.0.0.1:9").unwrap();
        let err = client.echo_health().await.unwrap_err();
        assert_eq!(err.code(), "NOX-050");
    }

    #[test]
    fn invalid_url_is_config_error() {
        assert!(HttpTaskClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn in_process_server_resolves_server_secrets() {
        let registry = Arc::new(ActionRegistry::with_builtins());
        let server = InProcessTaskServer::new("local", registry)
            .with_secrets(Arc::new(StaticSecretResolver::new().with("token", "t-42")));

        let action = Action::new("push", "core/set-outputs@v1").with_input("auth", "${{ server.token }}");
        let outcome = server.execute_task("wf", &action).await.unwrap();
        assert_eq!(outcome.state, ActionState::Success);
        assert_eq!(outcome.outputs["auth"], Value::from("t-42"));
    }

    #[tokio::test]
    async fn in_process_server_reports_unresolved() {
        let server = InProcessTaskServer::new("local", Arc::new(ActionRegistry::with_builtins()));
        let action = Action::new("push", "core/echo@v1").with_input("message", "${{ server.nope }}");
        let outcome = server.execute_task("wf", &action).await.unwrap();
        assert_eq!(outcome.state, ActionState::Error);
        assert!(outcome.error_message.unwrap().contains("server.nope"));
    }
}
