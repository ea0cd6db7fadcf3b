//! EventLog - append-only audit trail of a workflow run
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: workflow, job and step level events
//! - EventLog: thread-safe, append-only log
//!
//! Step inputs are recorded after secret masking; outputs are recorded by
//! name only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the workflow execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since workflow start (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// All event types (3 levels)
///
/// Uses Arc<str> for id fields to enable cheap cloning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // WORKFLOW LEVEL
    // ═══════════════════════════════════════════
    WorkflowStarted {
        workflow_id: String,
        name: String,
        job_count: usize,
        step_count: usize,
    },
    WorkflowCompleted {
        total_duration_ms: u64,
    },
    WorkflowFailed {
        error: String,
        failed_step: Option<Arc<str>>,
    },
    WorkflowCancelled {
        /// First step that did not run
        before_step: Option<Arc<str>>,
    },

    // ═══════════════════════════════════════════
    // JOB LEVEL
    // ═══════════════════════════════════════════
    JobStarted {
        job_id: Arc<str>,
        /// For-each iteration (0-based), if any
        iteration: Option<usize>,
    },
    JobSkipped {
        job_id: Arc<str>,
        condition: String,
    },
    JobCompleted {
        job_id: Arc<str>,
        iteration: Option<usize>,
    },
    JobFailed {
        job_id: Arc<str>,
        iteration: Option<usize>,
        error: String,
    },

    // ═══════════════════════════════════════════
    // STEP LEVEL
    // ═══════════════════════════════════════════
    /// Step invocation begins with resolved (masked) inputs
    StepStarted {
        step_id: Arc<str>,
        job_id: Arc<str>,
        inputs: Value,
        run_at_server: bool,
    },
    StepSkipped {
        step_id: Arc<str>,
        condition: String,
    },
    StepCompleted {
        step_id: Arc<str>,
        outputs: Vec<String>,
        duration_ms: u64,
    },
    StepFailed {
        step_id: Arc<str>,
        error: String,
        continue_on_error: bool,
        duration_ms: u64,
    },
    ValidationFailed {
        step_id: Arc<str>,
        expression: String,
    },
}

impl EventKind {
    /// Extract step_id if event is step-related
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::StepStarted { step_id, .. }
            | Self::StepSkipped { step_id, .. }
            | Self::StepCompleted { step_id, .. }
            | Self::StepFailed { step_id, .. }
            | Self::ValidationFailed { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    /// Extract job_id if event is job-related
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::JobSkipped { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. } => Some(job_id),
            Self::StepStarted { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    pub fn is_workflow_event(&self) -> bool {
        matches!(
            self,
            Self::WorkflowStarted { .. }
                | Self::WorkflowCompleted { .. }
                | Self::WorkflowFailed { .. }
                | Self::WorkflowCancelled { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (call at workflow start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned - use `with_events` for zero-copy access)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds read lock for duration of callback - keep it short.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events of one step (every for-each iteration included)
    pub fn filter_step(&self, step_id: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.step_id() == Some(step_id))
                .cloned()
                .collect()
        })
    }

    pub fn workflow_events(&self) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.is_workflow_event())
                .cloned()
                .collect()
        })
    }

    /// Count events for a specific step (no allocation)
    pub fn count_step(&self, step_id: &str) -> usize {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.step_id() == Some(step_id))
                .count()
        })
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow_started(job_count: usize) -> EventKind {
        EventKind::WorkflowStarted {
            workflow_id: "wf-123".to_string(),
            name: "deploy".to_string(),
            job_count,
            step_count: job_count * 2,
        }
    }

    fn step_started(step_id: &str) -> EventKind {
        EventKind::StepStarted {
            step_id: step_id.into(),
            job_id: "main".into(),
            inputs: json!({}),
            run_at_server: false,
        }
    }

    #[test]
    fn eventkind_id_extraction() {
        assert_eq!(step_started("s1").step_id(), Some("s1"));
        assert_eq!(step_started("s1").job_id(), Some("main"));
        assert_eq!(workflow_started(2).step_id(), None);
        assert!(workflow_started(2).is_workflow_event());
        assert!(EventKind::WorkflowCancelled { before_step: None }.is_workflow_event());
    }

    #[test]
    fn eventkind_serializes_with_type_tag() {
        let kind = EventKind::StepCompleted {
            step_id: "greet".into(),
            outputs: vec!["message".into()],
            duration_ms: 150,
        };

        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "step_completed");
        assert_eq!(json["step_id"], "greet");
        assert_eq!(json["outputs"][0], "message");
    }

    #[test]
    fn eventkind_deserializes_from_tagged_json() {
        let json = json!({"type": "job_skipped", "job_id": "cleanup", "condition": "NULL == true"});
        let kind: EventKind = serde_json::from_value(json).unwrap();
        assert_eq!(
            kind,
            EventKind::JobSkipped {
                job_id: "cleanup".into(),
                condition: "NULL == true".into(),
            }
        );
    }

    #[test]
    fn eventlog_emit_returns_monotonic_ids() {
        let log = EventLog::new();
        assert!(log.is_empty());

        let id1 = log.emit(workflow_started(3));
        let id2 = log.emit(step_started("t1"));
        let id3 = log.emit(step_started("t2"));

        assert_eq!((id1, id2, id3), (0, 1, 2));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn eventlog_filter_step_returns_only_matching() {
        let log = EventLog::new();
        log.emit(workflow_started(1));
        log.emit(step_started("alpha"));
        log.emit(step_started("beta"));
        log.emit(EventKind::StepCompleted {
            step_id: "alpha".into(),
            outputs: vec![],
            duration_ms: 3,
        });

        assert_eq!(log.filter_step("alpha").len(), 2);
        assert_eq!(log.count_step("beta"), 1);
        assert_eq!(log.workflow_events().len(), 1);
    }

    #[test]
    fn eventlog_clones_share_storage() {
        let log = EventLog::new();
        log.emit(workflow_started(1));

        let cloned = log.clone();
        log.emit(step_started("t1"));
        assert_eq!(cloned.len(), 2);
        assert_eq!(cloned.to_json()[1]["kind"]["type"], "step_started");
    }
}
