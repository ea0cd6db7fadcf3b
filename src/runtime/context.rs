//! WorkflowContext - the workflow, its variables and the cancellation token
//!
//! The executor reads the current job/step from here and writes step state
//! back. Every executed step (for-each iterations included) is kept as a
//! snapshot so a run can be inspected after it ends, even after a halt.

use tokio_util::sync::CancellationToken;

use crate::ast::{Action, Job, Workflow};
use crate::provider::ClientVariableProvider;
use crate::variable::Value;

pub struct WorkflowContext {
    workflow: Workflow,
    provider: ClientVariableProvider,
    cancellation: CancellationToken,
    executed: Vec<Action>,
}

impl WorkflowContext {
    pub fn new(workflow: Workflow, provider: ClientVariableProvider) -> Self {
        Self {
            workflow,
            provider,
            cancellation: CancellationToken::new(),
            executed: Vec::new(),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub(crate) fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.workflow
    }

    pub fn provider(&self) -> &ClientVariableProvider {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut ClientVariableProvider {
        &mut self.provider
    }

    /// Shared token; cancelling it stops the remaining jobs and steps
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.workflow.job(id)
    }

    /// Step as currently held by the workflow (last iteration for for-each jobs)
    pub fn action(&self, job_id: &str, step_id: &str) -> Option<&Action> {
        self.job(job_id).and_then(|job| job.step(step_id))
    }

    pub(crate) fn record(&mut self, action: &Action) {
        self.executed.push(action.clone());
    }

    /// Snapshots of every step that reached a final state, in run order
    pub fn executed(&self) -> &[Action] {
        &self.executed
    }

    /// All snapshots of one step (one per for-each iteration)
    pub fn executions_of(&self, step_id: &str) -> Vec<&Action> {
        self.executed
            .iter()
            .filter(|a| a.id.eq_ignore_ascii_case(step_id))
            .collect()
    }

    /// Resolved variable value (case-insensitive path)
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.provider.get(path)
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("workflow", &self.workflow.name)
            .field("executed", &self.executed.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
