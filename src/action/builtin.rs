//! Built-in `core/*` actions
//!
//! | uses | behaviour |
//! |------|-----------|
//! | `core/echo@v1` | returns `message` as output `message` |
//! | `core/set-outputs@v1` | every input becomes an output of the same name |
//! | `core/fail@v1` | sets the error state with `message` |
//! | `core/cancel@v1` | cancels the rest of the workflow |

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::ast::ActionState;
use crate::error::Result;
use crate::variable::Value;

use super::contract::{ActionContext, ActionMetadata, ActionProvider, InputSpec, OutputSpec};
use super::registry::ActionRegistry;

pub const ECHO: &str = "core/echo@v1";
pub const SET_OUTPUTS: &str = "core/set-outputs@v1";
pub const FAIL: &str = "core/fail@v1";
pub const CANCEL: &str = "core/cancel@v1";

pub(super) fn register(registry: &mut ActionRegistry) {
    registry.register(ECHO, || Box::new(Echo::default()));
    registry.register(SET_OUTPUTS, || Box::new(SetOutputs::default()));
    registry.register(FAIL, || Box::new(Fail::default()));
    registry.register(CANCEL, || Box::new(Cancel));
}

fn metadata(name: &str, description: &str) -> ActionMetadata {
    ActionMetadata {
        name: name.to_string(),
        author: "nox".to_string(),
        description: description.to_string(),
        ..Default::default()
    }
}

#[derive(Default)]
struct Echo {
    message: Value,
}

#[async_trait]
impl ActionProvider for Echo {
    fn discover(&self) -> ActionMetadata {
        let mut meta = metadata(ECHO, "Echo a message");
        meta.inputs
            .insert("message".into(), InputSpec::required("Text to echo"));
        meta.outputs
            .insert("message".into(), OutputSpec::new("The echoed text"));
        meta.requires_console = true;
        meta
    }

    async fn begin(&mut self, inputs: &BTreeMap<String, Value>) -> Result<()> {
        self.message = inputs.get("message").cloned().unwrap_or_default();
        Ok(())
    }

    async fn process(&mut self, ctx: &mut ActionContext) -> Result<BTreeMap<String, Value>> {
        debug!(step = ctx.step_id(), kind = self.message.kind(), "echo");
        Ok(BTreeMap::from([("message".to_string(), self.message.clone())]))
    }
}

#[derive(Default)]
struct SetOutputs {
    values: BTreeMap<String, Value>,
}

#[async_trait]
impl ActionProvider for SetOutputs {
    fn discover(&self) -> ActionMetadata {
        metadata(SET_OUTPUTS, "Publish every input as an output")
    }

    async fn begin(&mut self, inputs: &BTreeMap<String, Value>) -> Result<()> {
        self.values = inputs.clone();
        Ok(())
    }

    async fn process(&mut self, _ctx: &mut ActionContext) -> Result<BTreeMap<String, Value>> {
        Ok(std::mem::take(&mut self.values))
    }
}

#[derive(Default)]
struct Fail {
    message: String,
}

#[async_trait]
impl ActionProvider for Fail {
    fn discover(&self) -> ActionMetadata {
        let mut meta = metadata(FAIL, "Fail the step");
        meta.inputs.insert(
            "message".into(),
            InputSpec::optional("Error message", Some(Value::from("step failed"))),
        );
        meta
    }

    async fn begin(&mut self, inputs: &BTreeMap<String, Value>) -> Result<()> {
        self.message = inputs
            .get("message")
            .map(Value::to_display_string)
            .unwrap_or_default();
        Ok(())
    }

    async fn process(&mut self, ctx: &mut ActionContext) -> Result<BTreeMap<String, Value>> {
        ctx.set_state(ActionState::Error);
        ctx.set_error_message(self.message.clone());
        Ok(BTreeMap::new())
    }
}

struct Cancel;

#[async_trait]
impl ActionProvider for Cancel {
    fn discover(&self) -> ActionMetadata {
        metadata(CANCEL, "Cancel the remaining workflow")
    }

    async fn begin(&mut self, _inputs: &BTreeMap<String, Value>) -> Result<()> {
        Ok(())
    }

    async fn process(&mut self, ctx: &mut ActionContext) -> Result<BTreeMap<String, Value>> {
        ctx.cancel_workflow();
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    async fn run(uses: &str, inputs: &[(&str, Value)]) -> (ActionContext, Result<BTreeMap<String, Value>>) {
        let registry = ActionRegistry::with_builtins();
        let mut ctx = ActionContext::new("t", false, CancellationToken::new());
        let inputs = inputs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let result = registry.invoke(uses, inputs, &mut ctx).await;
        (ctx, result)
    }

    #[tokio::test]
    async fn set_outputs_mirrors_inputs() {
        let (ctx, outputs) = run(SET_OUTPUTS, &[("token", Value::from("abc")), ("count", Value::Int(0))]).await;
        let outputs = outputs.unwrap();
        assert_eq!(outputs["token"], Value::from("abc"));
        assert_eq!(outputs["count"], Value::Int(0));
        assert_eq!(ctx.state(), ActionState::Success);
    }

    #[tokio::test]
    async fn fail_sets_error_state_with_default_message() {
        let (ctx, outputs) = run(FAIL, &[]).await;
        assert!(outputs.unwrap().is_empty());
        assert_eq!(ctx.state(), ActionState::Error);
        assert_eq!(ctx.error_message(), Some("step failed"));
    }

    #[tokio::test]
    async fn cancel_trips_token() {
        let (ctx, _) = run(CANCEL, &[]).await;
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.state(), ActionState::Success);
    }
}
