//! Workflow Executor - sequential job/step state machine
//!
//! Jobs: `Pending → Skipped | Running → Succeeded | Failed | Cancelled`
//! Steps: `NotStarted → Running → Success | Error`
//!
//! Per step: `if` → inputs → unresolved check → invoke (local registry or
//! remote task server) → outputs → validation → continue-on-error.
//!
//! A halting error emits `WorkflowFailed` and is returned as `Err`; the
//! context keeps the partial state for inspection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::action::{ActionContext, ActionRegistry};
use crate::ast::{Action, ActionState, AssertionKind, Job, JobState, Workflow};
use crate::error::{NoxError, Result};
use crate::event::{EventKind, EventLog};
use crate::provider::ClientVariableProvider;
use crate::resolver::ForEachResolver;
use crate::runtime::context::WorkflowContext;
use crate::runtime::expression;
use crate::runtime::remote::{HttpTaskClient, RemoteTaskExecutor};
use crate::runtime::status::StatusPrinter;
use crate::variable::{mask_secret_values, Namespace, Value, VariableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub id: String,
    pub state: ActionState,
    pub error_message: Option<String>,
}

/// One job run; for-each jobs get one report per iteration
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job_id: String,
    pub name: String,
    pub state: JobState,
    pub iteration: Option<usize>,
    pub steps: Vec<StepReport>,
}

impl JobReport {
    fn of(job: &Job, iteration: Option<usize>) -> Self {
        Self {
            job_id: job.id.clone(),
            name: job.display_name().to_string(),
            state: job.state,
            iteration,
            steps: job
                .steps
                .iter()
                .map(|step| StepReport {
                    id: step.id.clone(),
                    state: step.state,
                    error_message: step.error_message.clone(),
                })
                .collect(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub workflow_id: String,
    pub status: RunStatus,
    pub jobs: Vec<JobReport>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Reports of one job (several for for-each jobs)
    pub fn job(&self, id: &str) -> Vec<&JobReport> {
        self.jobs
            .iter()
            .filter(|j| j.job_id.eq_ignore_ascii_case(id))
            .collect()
    }
}

/// How a job or step left the loop
enum Flow {
    Continue,
    Cancelled { before_step: Option<String> },
}

/// Result of one action invocation, before validation
struct Invocation {
    state: ActionState,
    outputs: BTreeMap<String, Value>,
    error_message: Option<String>,
}

pub struct WorkflowExecutor {
    context: WorkflowContext,
    registry: Arc<ActionRegistry>,
    remote: Option<Arc<dyn RemoteTaskExecutor>>,
    server_url: Option<String>,
    event_log: EventLog,
    status: StatusPrinter,
    overrides: Vec<(String, Value)>,
    reports: Vec<JobReport>,
    last_summary: Option<RunSummary>,
}

impl WorkflowExecutor {
    pub fn new(workflow: Workflow, provider: ClientVariableProvider, registry: Arc<ActionRegistry>) -> Self {
        Self {
            context: WorkflowContext::new(workflow, provider),
            registry,
            remote: None,
            server_url: None,
            event_log: EventLog::new(),
            status: StatusPrinter::default(),
            overrides: Vec::new(),
            reports: Vec::new(),
            last_summary: None,
        }
    }

    /// Task server used for `run-at-server` steps
    pub fn with_remote(mut self, remote: Arc<dyn RemoteTaskExecutor>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Server url taking precedence over the workflow's `server:`
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.status = StatusPrinter::new(quiet);
        self
    }

    /// Preset a variable; bare names land in `vars.*`
    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let path = if Namespace::of_path(name).is_some() {
            name.to_string()
        } else {
            format!("vars.{}", name)
        };
        self.overrides.push((path, value.into()));
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.context.cancellation_token()
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Summary of the last run, halted runs included (`RunStatus::Failed`)
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════
    // Run
    // ═══════════════════════════════════════════════════════════════

    #[instrument(skip_all, fields(workflow = %self.context.workflow().name))]
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let (workflow_id, name, job_count, step_count) = {
            let wf = self.context.workflow();
            (wf.id.clone(), wf.name.clone(), wf.jobs.len(), wf.action_count())
        };

        self.event_log.emit(EventKind::WorkflowStarted {
            workflow_id: workflow_id.clone(),
            name: name.clone(),
            job_count,
            step_count,
        });
        self.status.workflow_started(&name, step_count);
        info!(workflow_id = %workflow_id, jobs = job_count, steps = step_count, "workflow started");

        let workflow = self.context.workflow().clone();
        let provider = self.context.provider_mut();
        if let Err(e) = provider.initialize(&workflow) {
            return Err(self.halt(started, e, None));
        }
        for (path, value) in std::mem::take(&mut self.overrides) {
            self.context.provider_mut().set_variable(&path, value);
        }
        self.context.provider_mut().resolve_all().await;

        for index in 0..job_count {
            if self.context.is_cancelled() {
                let next = self.context.workflow().jobs[index]
                    .steps
                    .first()
                    .map(|s| s.id.clone());
                return Ok(self.cancelled(started, next));
            }
            match self.run_job(index).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Cancelled { before_step }) => return Ok(self.cancelled(started, before_step)),
                Err((e, failed_step)) => return Err(self.halt(started, e, failed_step)),
            }
        }

        let duration = started.elapsed();
        self.event_log.emit(EventKind::WorkflowCompleted {
            total_duration_ms: duration.as_millis() as u64,
        });
        self.status.done(duration);
        info!(duration_ms = duration.as_millis() as u64, "workflow completed");
        Ok(self.finish(RunStatus::Succeeded, duration))
    }

    fn finish(&mut self, status: RunStatus, duration: Duration) -> RunSummary {
        let summary = RunSummary {
            workflow_id: self.context.workflow().id.clone(),
            status,
            jobs: self.reports.clone(),
            duration,
        };
        self.last_summary = Some(summary.clone());
        summary
    }

    fn halt(&mut self, started: Instant, error: NoxError, failed_step: Option<String>) -> NoxError {
        warn!(error = %error, step = ?failed_step, "workflow halted");
        self.event_log.emit(EventKind::WorkflowFailed {
            error: mask_secret_values(&error.to_string(), self.context.provider().store()),
            failed_step: failed_step.map(Arc::from),
        });
        self.finish(RunStatus::Failed, started.elapsed());
        error
    }

    fn cancelled(&mut self, started: Instant, before_step: Option<String>) -> RunSummary {
        info!(before_step = ?before_step, "workflow cancelled");
        self.event_log.emit(EventKind::WorkflowCancelled {
            before_step: before_step.map(Arc::from),
        });
        self.status.cancelled();
        self.finish(RunStatus::Cancelled, started.elapsed())
    }

    // ═══════════════════════════════════════════════════════════════
    // Jobs
    // ═══════════════════════════════════════════════════════════════

    /// Errors carry the id of the step that failed, if any
    async fn run_job(&mut self, index: usize) -> std::result::Result<Flow, (NoxError, Option<String>)> {
        let mut job = self.context.workflow().jobs[index].clone();
        self.context.provider_mut().resolve_job_variables(&mut job).await;

        if let Some(condition) = job.if_condition.clone() {
            let text = self.context.provider().condition_text(&condition);
            let holds = expression::evaluate(&text).map_err(|e| (e, None))?;
            if !holds {
                let message = job
                    .display
                    .if_condition
                    .clone()
                    .unwrap_or_else(|| format!("Skipped: {}", text));
                debug!(job = %job.id, condition = %text, "job skipped");
                job.state = JobState::Skipped;
                self.event_log.emit(EventKind::JobSkipped {
                    job_id: job.id.as_str().into(),
                    condition: text,
                });
                self.status.job_skipped(job.display_name(), &message);
                self.reports.push(JobReport::of(&job, None));
                self.context.workflow_mut().jobs[index].state = JobState::Skipped;
                return Ok(Flow::Continue);
            }
        }

        let Some(collection) = job.for_each.clone() else {
            let result = self.run_job_instance(&mut job, None).await;
            self.context.workflow_mut().jobs[index] = job;
            return result;
        };

        let items = match collection.normalize() {
            Value::List(items) => items,
            other => {
                let found = match &other {
                    Value::String(text) => format!("'{}'", text),
                    value => value.kind().to_string(),
                };
                let e = NoxError::ForEachNotList {
                    job_id: job.id.clone(),
                    found,
                };
                self.context.workflow_mut().jobs[index].state = JobState::Failed;
                return Err((e, None));
            }
        };
        debug!(job = %job.id, iterations = items.len(), "for-each expanded");

        let max_depth = self.context.provider().max_walk_depth();
        let mut last_state = JobState::Succeeded;
        for (i, item) in items.into_iter().enumerate() {
            if self.context.is_cancelled() {
                last_state = JobState::Cancelled;
                self.context.workflow_mut().jobs[index].state = last_state;
                return Ok(Flow::Cancelled {
                    before_step: job.steps.first().map(|s| s.id.clone()),
                });
            }

            let mut instance = job.clone();
            let resolver = ForEachResolver::new(item, i).with_max_depth(max_depth);
            self.context.provider_mut().store_mut().push_scope();
            self.context.provider_mut().resolve_with(&resolver).await;
            let result = self.run_job_instance(&mut instance, Some(i)).await;
            self.context.provider_mut().store_mut().pop_scope();

            last_state = instance.state;
            self.context.workflow_mut().jobs[index].steps = instance.steps;
            match result {
                Ok(Flow::Continue) => {}
                other => {
                    self.context.workflow_mut().jobs[index].state = last_state;
                    return other;
                }
            }
        }
        self.context.workflow_mut().jobs[index].state = last_state;
        Ok(Flow::Continue)
    }

    async fn run_job_instance(
        &mut self,
        job: &mut Job,
        iteration: Option<usize>,
    ) -> std::result::Result<Flow, (NoxError, Option<String>)> {
        job.state = JobState::Running;
        self.event_log.emit(EventKind::JobStarted {
            job_id: job.id.as_str().into(),
            iteration,
        });
        self.status.job_started(job.display_name(), iteration);

        for i in 0..job.steps.len() {
            if self.context.is_cancelled() {
                job.state = JobState::Cancelled;
                self.reports.push(JobReport::of(job, iteration));
                return Ok(Flow::Cancelled {
                    before_step: Some(job.steps[i].id.clone()),
                });
            }

            if let Err(e) = self.run_step(&mut job.steps[i]).await {
                job.state = JobState::Failed;
                self.event_log.emit(EventKind::JobFailed {
                    job_id: job.id.as_str().into(),
                    iteration,
                    error: mask_secret_values(&e.to_string(), self.context.provider().store()),
                });
                self.reports.push(JobReport::of(job, iteration));
                return Err((e, Some(job.steps[i].id.clone())));
            }
        }

        job.state = JobState::Succeeded;
        self.event_log.emit(EventKind::JobCompleted {
            job_id: job.id.as_str().into(),
            iteration,
        });
        self.reports.push(JobReport::of(job, iteration));
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════
    // Steps
    // ═══════════════════════════════════════════════════════════════

    /// Run one step; `Err` halts the workflow
    #[instrument(skip_all, fields(step = %action.id))]
    async fn run_step(&mut self, action: &mut Action) -> Result<()> {
        let started = Instant::now();

        if let Some(condition) = action.if_condition.clone() {
            let text = self.context.provider().condition_text(&condition);
            let holds = match expression::evaluate(&text) {
                Ok(holds) => holds,
                Err(e) => return Err(self.step_failed(action, e, started, true)),
            };
            if !holds {
                let message = match &action.display.if_condition {
                    Some(template) => self.context.provider().render_display(template),
                    None => format!("Skipped: {}", text),
                };
                self.event_log.emit(EventKind::StepSkipped {
                    step_id: action.id.as_str().into(),
                    condition: text,
                });
                self.status.step_skipped(action.sequence, action.display_name(), &message);
                self.context.record(action);
                return Ok(());
            }
        }

        action.set_state(ActionState::Running);
        let inputs = self.context.provider_mut().get_input_variables(action).await;

        let unresolved = self.context.provider().get_unresolved_input_variables(action);
        if !unresolved.is_empty() {
            let e = NoxError::UnresolvedVariables {
                step_id: action.id.clone(),
                variables: unresolved.iter().map(|u| u.describe()).collect(),
            };
            return Err(self.step_failed(action, e, started, true));
        }

        self.event_log.emit(EventKind::StepStarted {
            step_id: action.id.as_str().into(),
            job_id: action.job_id.as_str().into(),
            inputs: self.masked_inputs(&inputs),
            run_at_server: action.run_at_server,
        });

        let invoked = if action.run_at_server {
            self.invoke_remote(action).await
        } else {
            self.invoke_local(action, inputs).await
        };
        let invocation = match invoked {
            Ok(invocation) => invocation,
            Err(e @ (NoxError::ServerUnreachable { .. } | NoxError::MissingServerUrl { .. })) => {
                return Err(self.step_failed(action, e, started, true));
            }
            Err(e) => Invocation {
                state: ActionState::Error,
                outputs: BTreeMap::new(),
                error_message: Some(e.to_string()),
            },
        };

        self.context
            .provider_mut()
            .store_output_variables(action, &invocation.outputs);
        action.state = invocation.state;
        action.error_message = invocation.error_message;

        if action.state == ActionState::Error {
            let reason = action
                .error_message
                .clone()
                .unwrap_or_else(|| "action reported an error".to_string());
            let e = NoxError::ActionFailed {
                step_id: action.id.clone(),
                reason,
            };
            return self.settle_failure(action, e, started);
        }

        if !action.validate.is_empty() {
            let (holds, expression) = match self.validate(action) {
                Ok(result) => result,
                // an assertion that cannot be evaluated is a failed validation
                Err(NoxError::Expression { expression, reason }) => {
                    (false, format!("{} ({})", expression, reason))
                }
                Err(e) => return self.settle_failure(action, e, started),
            };
            if !holds {
                self.event_log.emit(EventKind::ValidationFailed {
                    step_id: action.id.as_str().into(),
                    expression: expression.clone(),
                });
                let e = NoxError::ValidationFailed {
                    step_id: action.id.clone(),
                    expression,
                };
                return self.settle_failure(action, e, started);
            }
        }

        let duration = started.elapsed();
        self.event_log.emit(EventKind::StepCompleted {
            step_id: action.id.as_str().into(),
            outputs: invocation.outputs.keys().cloned().collect(),
            duration_ms: duration.as_millis() as u64,
        });
        self.status.step_succeeded(
            action.sequence,
            action.display_name(),
            action.display.success.as_deref(),
            duration,
        );
        self.context.record(action);
        Ok(())
    }

    /// Continue-on-error turns a failure into a soft success
    fn settle_failure(&mut self, action: &mut Action, error: NoxError, started: Instant) -> Result<()> {
        if action.continue_on_error {
            self.step_failed(action, error, started, false);
            Ok(())
        } else {
            Err(self.step_failed(action, error, started, true))
        }
    }

    /// Mark the step failed, emit and print; returns the error for halting
    fn step_failed(&mut self, action: &mut Action, error: NoxError, started: Instant, halting: bool) -> NoxError {
        let store = self.context.provider().store();
        let message = mask_secret_values(&error.to_string(), store);
        // keep the action's own message when it reported the error itself
        match action.error_message.take() {
            Some(own) if action.state == ActionState::Error => {
                action.error_message = Some(mask_secret_values(&own, store));
            }
            _ => action.fail(message.clone()),
        }

        let shown = action.display.error.clone().unwrap_or_else(|| message.clone());
        let continued = action.continue_on_error && !halting;
        self.event_log.emit(EventKind::StepFailed {
            step_id: action.id.as_str().into(),
            error: message,
            continue_on_error: continued,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        self.status
            .step_failed(action.sequence, action.display_name(), &shown, continued);
        self.context.record(action);
        error
    }

    /// Fold `that` / `and-that` / `or-that` left to right
    fn validate(&self, action: &Action) -> Result<(bool, String)> {
        let provider = self.context.provider();
        let mut combined: Option<bool> = None;
        let mut texts = Vec::new();
        for assertion in action.validate.iter() {
            let text = provider.condition_text(&assertion.expression);
            let holds = expression::evaluate(&text)?;
            combined = Some(match (combined, assertion.kind) {
                (None, _) => holds,
                (Some(acc), AssertionKind::OrThat) => acc || holds,
                (Some(acc), _) => acc && holds,
            });
            texts.push(text);
        }
        Ok((combined.unwrap_or(true), texts.join("; ")))
    }

    fn masked_inputs(&self, inputs: &BTreeMap<String, Value>) -> serde_json::Value {
        let store = self.context.provider().store();
        let masked: serde_json::Map<String, serde_json::Value> = inputs
            .iter()
            .map(|(name, value)| (name.clone(), mask_json(value.clone().into(), store)))
            .collect();
        serde_json::Value::Object(masked)
    }

    async fn invoke_local(&self, action: &Action, inputs: BTreeMap<String, Value>) -> Result<Invocation> {
        let mut ctx = ActionContext::new(&action.id, false, self.context.cancellation_token());
        let outputs = self.registry.invoke(&action.uses, inputs, &mut ctx).await?;
        Ok(Invocation {
            state: ctx.state(),
            outputs,
            error_message: ctx.error_message().map(str::to_string),
        })
    }

    async fn invoke_remote(&mut self, action: &Action) -> Result<Invocation> {
        let remote = self.remote_executor(action)?;
        let health = remote.echo_health().await?;
        debug!(server = %health.name, "task server healthy");

        let workflow_id = self.context.workflow().id.clone();
        let outcome = remote.execute_task(&workflow_id, action).await?;
        Ok(Invocation {
            state: outcome.state,
            outputs: outcome.outputs,
            error_message: outcome.error_message,
        })
    }

    /// Explicit remote, else an HTTP client for the configured server url
    fn remote_executor(&mut self, action: &Action) -> Result<Arc<dyn RemoteTaskExecutor>> {
        if let Some(remote) = &self.remote {
            return Ok(Arc::clone(remote));
        }
        let url = self
            .server_url
            .clone()
            .or_else(|| self.context.workflow().server.clone())
            .map(|url| self.context.provider().resolve_text(&url))
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| NoxError::MissingServerUrl {
                step_id: action.id.clone(),
            })?;
        let client: Arc<dyn RemoteTaskExecutor> = Arc::new(HttpTaskClient::new(&url)?);
        self.remote = Some(Arc::clone(&client));
        Ok(client)
    }
}

/// Mask secret values in every string leaf
fn mask_json(json: serde_json::Value, store: &VariableStore) -> serde_json::Value {
    match json {
        serde_json::Value::String(text) => serde_json::Value::String(mask_secret_values(&text, store)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(|v| mask_json(v, store)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, mask_json(v, store)))
                .collect(),
        ),
        other => other,
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("context", &self.context)
            .field("registry", &self.registry)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}
