//! Action provider contract
//!
//! Every action type exposes `discover` (static metadata) and the
//! `begin → process → end` lifecycle. The engine resolves inputs before
//! `begin` and stores whatever `process` returns as step outputs; it never
//! looks inside an action.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::ast::ActionState;
use crate::error::{NoxError, Result};
use crate::variable::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    pub description: String,
    pub default_value: Option<Value>,
    pub is_required: bool,
}

impl InputSpec {
    pub fn required(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            default_value: None,
            is_required: true,
        }
    }

    pub fn optional(description: impl Into<String>, default_value: Option<Value>) -> Self {
        Self {
            description: description.into(),
            default_value,
            is_required: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputSpec {
    pub description: String,
}

impl OutputSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// Result of `discover()`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    pub name: String,
    pub author: String,
    pub description: String,
    pub inputs: BTreeMap<String, InputSpec>,
    pub outputs: BTreeMap<String, OutputSpec>,
    pub requires_console: bool,
}

impl ActionMetadata {
    /// Fill absent inputs from defaults; fail on a missing required input
    pub fn apply_defaults(&self, step_id: &str, inputs: &mut BTreeMap<String, Value>) -> Result<()> {
        for (name, spec) in &self.inputs {
            let present = inputs
                .iter()
                .any(|(k, v)| k.eq_ignore_ascii_case(name) && !v.is_null());
            if present {
                continue;
            }
            match &spec.default_value {
                Some(default) => {
                    inputs.insert(name.clone(), default.clone());
                }
                None if spec.is_required => {
                    return Err(NoxError::MissingRequiredInput {
                        step_id: step_id.to_string(),
                        input: name.clone(),
                    });
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// What `process` can see and change
#[derive(Debug, Clone)]
pub struct ActionContext {
    step_id: String,
    state: ActionState,
    error_message: Option<String>,
    is_server: bool,
    cancellation: CancellationToken,
}

impl ActionContext {
    pub fn new(step_id: impl Into<String>, is_server: bool, cancellation: CancellationToken) -> Self {
        Self {
            step_id: step_id.into(),
            state: ActionState::Running,
            error_message: None,
            is_server,
            cancellation,
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn set_state(&mut self, state: ActionState) {
        self.state = state;
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Running on the task server rather than the local process
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Stop every remaining job and step
    pub fn cancel_workflow(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Action lifecycle implemented by every action type
///
/// # Example
/// ```rust,ignore
/// struct Hello;
///
/// #[async_trait]
/// impl ActionProvider for Hello {
///     fn discover(&self) -> ActionMetadata { ActionMetadata::default() }
///     async fn begin(&mut self, _: &BTreeMap<String, Value>) -> Result<()> { Ok(()) }
///     async fn process(&mut self, _: &mut ActionContext) -> Result<BTreeMap<String, Value>> {
///         Ok(BTreeMap::from([("greeting".into(), "hello".into())]))
///     }
/// }
/// ```
#[async_trait]
pub trait ActionProvider: Send {
    fn discover(&self) -> ActionMetadata;

    async fn begin(&mut self, inputs: &BTreeMap<String, Value>) -> Result<()>;

    async fn process(&mut self, ctx: &mut ActionContext) -> Result<BTreeMap<String, Value>>;

    async fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ActionMetadata {
        ActionMetadata {
            name: "deploy".into(),
            inputs: BTreeMap::from([
                ("target".to_string(), InputSpec::required("where to deploy")),
                (
                    "retries".to_string(),
                    InputSpec::optional("retry count", Some(Value::Int(3))),
                ),
                ("note".to_string(), InputSpec::optional("free text", None)),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_absent_inputs() {
        let mut inputs = BTreeMap::from([("target".to_string(), Value::from("prod"))]);
        metadata().apply_defaults("d", &mut inputs).unwrap();
        assert_eq!(inputs["retries"], Value::Int(3));
        assert!(!inputs.contains_key("note"));
    }

    #[test]
    fn missing_required_input_fails() {
        let mut inputs = BTreeMap::new();
        let err = metadata().apply_defaults("d", &mut inputs).unwrap_err();
        assert_eq!(err.code(), "NOX-021");
        assert!(err.to_string().contains("'target'"));
    }

    #[test]
    fn cancel_workflow_trips_shared_token() {
        let token = CancellationToken::new();
        let ctx = ActionContext::new("s", false, token.clone());
        assert_eq!(ctx.state(), ActionState::Running);
        ctx.cancel_workflow();
        assert!(token.is_cancelled());
    }
}
