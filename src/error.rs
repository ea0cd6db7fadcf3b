//! Nox Error Types with Error Codes
//!
//! Error code ranges:
//! - NOX-000-009: Workflow document errors
//! - NOX-010-019: Step execution errors
//! - NOX-020-029: Action registry / contract errors
//! - NOX-030-039: Variable resolution errors
//! - NOX-040-049: Expression / for-each errors
//! - NOX-050-059: Remote task server errors
//! - NOX-060-069: Resolver backend errors (cache, secrets)
//! - NOX-090-099: Config / IO errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NoxError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum NoxError {
    // ═══════════════════════════════════════════
    // WORKFLOW ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[NOX-001] Failed to parse workflow: {details}")]
    ParseError { details: String },

    #[error("[NOX-002] Invalid workflow: {reason}")]
    InvalidWorkflow { reason: String },

    #[error("[NOX-003] Workflow file not found: {path}")]
    WorkflowNotFound { path: String },

    // ═══════════════════════════════════════════
    // STEP EXECUTION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[NOX-010] Step '{step_id}' failed: {reason}")]
    ActionFailed { step_id: String, reason: String },

    #[error("[NOX-011] Step '{step_id}' failed validation: {expression}")]
    ValidationFailed { step_id: String, expression: String },

    // ═══════════════════════════════════════════
    // ACTION ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[NOX-020] No action registered for '{uses}'")]
    ActionNotFound { uses: String },

    #[error("[NOX-021] Step '{step_id}' is missing required input '{input}'")]
    MissingRequiredInput { step_id: String, input: String },

    // ═══════════════════════════════════════════
    // VARIABLE ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[NOX-030] Step '{step_id}' has unresolved variables: {}", .variables.join(", "))]
    UnresolvedVariables {
        step_id: String,
        variables: Vec<String>,
    },

    #[error("[NOX-031] Invalid variable assignment '{assignment}' (expected name=value)")]
    InvalidAssignment { assignment: String },

    // ═══════════════════════════════════════════
    // EXPRESSION ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[NOX-040] Cannot evaluate '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    #[error("[NOX-041] for-each of job '{job_id}' must resolve to a list, got {found}")]
    ForEachNotList { job_id: String, found: String },

    // ═══════════════════════════════════════════
    // REMOTE ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[NOX-050] Task server '{url}' is unreachable: {reason}")]
    ServerUnreachable { url: String, reason: String },

    #[error("[NOX-051] Step '{step_id}' runs at server but the workflow has no server url")]
    MissingServerUrl { step_id: String },

    #[error("[NOX-052] Remote task failed: {reason}")]
    RemoteTask { reason: String },

    // ═══════════════════════════════════════════
    // RESOLVER BACKEND ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[NOX-060] Session cache error: {reason}")]
    CacheError { reason: String },

    #[error("[NOX-061] Secret resolution failed: {reason}")]
    SecretError { reason: String },

    #[error("[NOX-062] Network probe failed: {reason}")]
    NetworkError { reason: String },

    // ═══════════════════════════════════════════
    // CONFIG / IO ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[NOX-090] Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("[NOX-091] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[NOX-092] JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<serde_yaml::Error> for NoxError {
    fn from(e: serde_yaml::Error) -> Self {
        NoxError::ParseError {
            details: e.to_string(),
        }
    }
}

impl NoxError {
    /// Stable error code (e.g. `NOX-030`)
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "NOX-001",
            Self::InvalidWorkflow { .. } => "NOX-002",
            Self::WorkflowNotFound { .. } => "NOX-003",
            Self::ActionFailed { .. } => "NOX-010",
            Self::ValidationFailed { .. } => "NOX-011",
            Self::ActionNotFound { .. } => "NOX-020",
            Self::MissingRequiredInput { .. } => "NOX-021",
            Self::UnresolvedVariables { .. } => "NOX-030",
            Self::InvalidAssignment { .. } => "NOX-031",
            Self::Expression { .. } => "NOX-040",
            Self::ForEachNotList { .. } => "NOX-041",
            Self::ServerUnreachable { .. } => "NOX-050",
            Self::MissingServerUrl { .. } => "NOX-051",
            Self::RemoteTask { .. } => "NOX-052",
            Self::CacheError { .. } => "NOX-060",
            Self::SecretError { .. } => "NOX-061",
            Self::NetworkError { .. } => "NOX-062",
            Self::ConfigError { .. } => "NOX-090",
            Self::Io(_) => "NOX-091",
            Self::Json(_) => "NOX-092",
        }
    }

    /// Resolver-side failures that resolvers swallow into "unresolved"
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CacheError { .. } | Self::SecretError { .. } | Self::NetworkError { .. }
        )
    }
}

impl FixSuggestion for NoxError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            NoxError::ParseError { .. } => Some("Check YAML syntax: indentation and quoting"),
            NoxError::InvalidWorkflow { .. } => {
                Some("Every job needs steps, every step needs an id and a 'uses' action")
            }
            NoxError::WorkflowNotFound { .. } => Some("Check the file path exists"),
            NoxError::ActionFailed { .. } => {
                Some("Inspect the step's error output or mark it continue-on-error")
            }
            NoxError::ValidationFailed { .. } => {
                Some("Check the step outputs referenced by the validate assertion")
            }
            NoxError::ActionNotFound { .. } => {
                Some("Check the 'uses' identifier, e.g. core/echo@v1")
            }
            NoxError::MissingRequiredInput { .. } => Some("Add the input under the step's 'with:'"),
            NoxError::UnresolvedVariables { .. } => Some(
                "Define the variable (vars:, --var, solution file, env) or fix the ${{ }} path",
            ),
            NoxError::InvalidAssignment { .. } => Some("Use --var name=value"),
            NoxError::Expression { .. } => {
                Some("Quote string operands: '${{ vars.x }}' == 'value'")
            }
            NoxError::ForEachNotList { .. } => {
                Some("Point for-each at a list, e.g. ${{ solution.items }}")
            }
            NoxError::ServerUnreachable { .. } => {
                Some("Check the task server is running and the server url is correct")
            }
            NoxError::MissingServerUrl { .. } => {
                Some("Set 'server:' in the workflow or pass --server")
            }
            NoxError::RemoteTask { .. } => Some("Check the task server logs"),
            NoxError::CacheError { .. } => Some("Log in again to refresh the session cache"),
            NoxError::SecretError { .. } => {
                Some("Check the secret exists in the configured secret store")
            }
            NoxError::NetworkError { .. } => Some("Check network connectivity"),
            NoxError::ConfigError { .. } => Some("Fix or delete ~/.config/nox/config.toml"),
            NoxError::Io(_) => Some("Check file path and permissions"),
            NoxError::Json(_) => Some("Ensure the document is valid JSON"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_variables_lists_every_name() {
        let err = NoxError::UnresolvedVariables {
            step_id: "deploy".into(),
            variables: vec!["vars.missing".into(), "env.NOPE".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("NOX-030"));
        assert!(msg.contains("vars.missing, env.NOPE"));
        assert_eq!(err.code(), "NOX-030");
    }

    #[test]
    fn yaml_errors_become_parse_errors() {
        let yaml_err = serde_yaml::from_str::<Vec<String>>("{ not: [a list").unwrap_err();
        let err: NoxError = yaml_err.into();
        assert_eq!(err.code(), "NOX-001");
    }

    #[test]
    fn resolver_failures_are_recoverable() {
        assert!(NoxError::NetworkError { reason: "x".into() }.is_recoverable());
        assert!(NoxError::CacheError { reason: "x".into() }.is_recoverable());
        assert!(!NoxError::ActionFailed {
            step_id: "a".into(),
            reason: "b".into()
        }
        .is_recoverable());
    }

    #[test]
    fn remote_errors_have_suggestions() {
        assert!(NoxError::ServerUnreachable {
            url: "http://x".into(),
            reason: "down".into()
        }
        .fix_suggestion()
        .is_some());
    }
}
