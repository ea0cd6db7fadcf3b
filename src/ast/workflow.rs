//! Workflow Types - root document and jobs
//!
//! Contains the YAML-parsed types:
//! - `Workflow`: name, optional id/server, `vars:` block and jobs
//! - `Job`: ordered steps, optional `if` and `for-each`
//! - `JobState`: job lifecycle
//!
//! Loading assigns 1-based step sequences across the whole workflow and
//! stamps each step with its job id, then checks the structural rules.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NoxError, Result};
use crate::variable::Value;

use super::action::{Action, DisplayMessages};

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    #[default]
    Pending,
    Skipped,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Skipped => "skipped",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// An ordered group of steps
///
/// # Example
///
/// ```yaml
/// - id: deploy
///   name: Deploy regions
///   for-each: ${{ solution.regions }}
///   steps:
///     - id: push
///       uses: core/echo@v1
///       with:
///         message: "Deploying ${{ foreach.name }}"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sequence: usize,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<String>,
    /// Loop collection: a reference text or an inline list
    #[serde(default, alias = "forEach", skip_serializing_if = "Option::is_none")]
    pub for_each: Option<Value>,
    #[serde(default, skip_serializing_if = "DisplayMessages::is_empty")]
    pub display: DisplayMessages,
    #[serde(default)]
    pub steps: Vec<Action>,
    #[serde(default)]
    pub state: JobState,
}

impl Job {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn is_for_each(&self) -> bool {
        self.for_each.is_some()
    }

    pub fn step(&self, id: &str) -> Option<&Action> {
        self.steps.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }
}

/// Workflow parsed from YAML (raw)
#[derive(Debug, Deserialize)]
struct WorkflowRaw {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    vars: BTreeMap<String, Value>,
    #[serde(default)]
    jobs: Vec<Job>,
}

/// Root workflow document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    /// Run identifier (v4 uuid unless the document sets one)
    pub id: String,
    pub name: String,
    /// Task server for `run-at-server` steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, Value>,
    pub jobs: Vec<Job>,
}

impl<'de> Deserialize<'de> for Workflow {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = WorkflowRaw::deserialize(deserializer)?;
        let mut workflow = Workflow {
            id: raw
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: raw.name,
            server: raw.server.filter(|s| !s.trim().is_empty()),
            vars: raw.vars,
            jobs: raw.jobs,
        };
        workflow.assign_sequences();
        Ok(workflow)
    }
}

impl Workflow {
    /// Parse and validate a workflow document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let workflow: Workflow = serde_yaml::from_str(text)?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Read, parse and validate a workflow file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NoxError::WorkflowNotFound {
                    path: path.display().to_string(),
                }
            } else {
                NoxError::Io(e)
            }
        })?;
        Self::from_yaml(&text)
    }

    /// 1-based step sequence across all jobs; steps learn their job id
    fn assign_sequences(&mut self) {
        let mut sequence = 0;
        for (index, job) in self.jobs.iter_mut().enumerate() {
            job.sequence = index + 1;
            if job.name.is_empty() {
                job.name = job.id.clone();
            }
            for step in &mut job.steps {
                sequence += 1;
                step.sequence = sequence;
                step.job_id = job.id.clone();
                if step.name.is_empty() {
                    step.name = step.id.clone();
                }
            }
        }
    }

    /// Structural checks
    ///
    /// - at least one job, every job has an id and steps
    /// - job ids unique, step ids unique within their job
    /// - every step names a `uses` action
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(NoxError::InvalidWorkflow { reason });

        if self.name.trim().is_empty() {
            return invalid("workflow name is empty".into());
        }
        if self.jobs.is_empty() {
            return invalid("workflow has no jobs".into());
        }

        let mut job_ids = HashSet::new();
        for job in &self.jobs {
            if job.id.trim().is_empty() {
                return invalid(format!("job #{} has no id", job.sequence));
            }
            if !job_ids.insert(job.id.to_lowercase()) {
                return invalid(format!("duplicate job id '{}'", job.id));
            }
            if job.steps.is_empty() {
                return invalid(format!("job '{}' has no steps", job.id));
            }

            let mut step_ids = HashSet::new();
            for step in &job.steps {
                if step.id.trim().is_empty() {
                    return invalid(format!(
                        "step #{} of job '{}' has no id",
                        step.sequence, job.id
                    ));
                }
                if !step_ids.insert(step.id.to_lowercase()) {
                    return invalid(format!(
                        "duplicate step id '{}' in job '{}'",
                        step.id, job.id
                    ));
                }
                if step.uses.trim().is_empty() {
                    return invalid(format!("step '{}' has an empty 'uses'", step.id));
                }
            }
        }
        Ok(())
    }

    /// Canonical text form scanned for variable references
    pub fn canonical_text(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(NoxError::from)
    }

    pub fn action_count(&self) -> usize {
        self.jobs.iter().map(|j| j.steps.len()).sum()
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id.eq_ignore_ascii_case(id))
    }

    /// All steps in sequence order
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.jobs.iter().flat_map(|j| j.steps.iter())
    }

    /// Whether any step needs the task server
    pub fn needs_server(&self) -> bool {
        self.actions().any(|a| a.run_at_server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AssertionKind;

    const SAMPLE: &str = r#"
name: sample
server: http://localhost:5000
vars:
  name: World
jobs:
  - id: greet
    steps:
      - id: hello
        uses: core/echo@v1
        with:
          message: "Hello, ${{ vars.name }}"
      - id: check
        uses: core/set-outputs@v1
        validate:
          - that: "${{ steps.check.outputs.count }} > 0"
  - id: loop
    forEach: ${{ solution.items }}
    if: "${{ vars.flag }} == true"
    steps:
      - id: item
        uses: core/echo@v1
"#;

    #[test]
    fn assigns_sequences_across_jobs() {
        let wf = Workflow::from_yaml(SAMPLE).unwrap();
        let seqs: Vec<usize> = wf.actions().map(|a| a.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(wf.jobs[1].sequence, 2);
        assert_eq!(wf.jobs[1].steps[0].job_id, "loop");
        assert_eq!(wf.jobs[0].name, "greet");
    }

    #[test]
    fn for_each_alias_and_if_parse() {
        let wf = Workflow::from_yaml(SAMPLE).unwrap();
        let job = wf.job("LOOP").unwrap();
        assert_eq!(job.for_each, Some(Value::from("${{ solution.items }}")));
        assert_eq!(job.if_condition.as_deref(), Some("${{ vars.flag }} == true"));
        assert_eq!(wf.actions().nth(1).unwrap().validate.0[0].kind, AssertionKind::That);
    }

    #[test]
    fn id_defaults_to_uuid() {
        let wf = Workflow::from_yaml(SAMPLE).unwrap();
        assert!(uuid::Uuid::parse_str(&wf.id).is_ok());
        assert!(!wf.needs_server());
    }

    #[test]
    fn canonical_text_carries_references() {
        let wf = Workflow::from_yaml(SAMPLE).unwrap();
        let text = wf.canonical_text().unwrap();
        assert!(text.contains("${{ vars.name }}"));
        assert!(text.contains("${{ solution.items }}"));
        assert!(text.contains("for-each"));
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let yaml = r#"
name: dup
jobs:
  - id: a
    steps:
      - { id: s, uses: core/echo@v1 }
      - { id: S, uses: core/echo@v1 }
"#;
        let err = Workflow::from_yaml(yaml).unwrap_err();
        assert_eq!(err.code(), "NOX-002");
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn rejects_empty_uses_and_empty_jobs() {
        let empty_uses = "name: x\njobs:\n  - id: a\n    steps:\n      - { id: s, uses: '' }\n";
        assert!(Workflow::from_yaml(empty_uses).is_err());

        let no_steps = "name: x\njobs:\n  - id: a\n    steps: []\n";
        let err = Workflow::from_yaml(no_steps).unwrap_err();
        assert!(err.to_string().contains("has no steps"));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = Workflow::from_yaml("name: [unclosed").unwrap_err();
        assert_eq!(err.code(), "NOX-001");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = Workflow::load("/definitely/not/here.yaml").await.unwrap_err();
        assert_eq!(err.code(), "NOX-003");
    }
}
