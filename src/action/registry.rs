//! ActionRegistry - `uses` identifier → action factory
//!
//! Identifiers are matched case-insensitively. Every invocation gets a
//! fresh provider instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, instrument};

use crate::ast::ActionState;
use crate::error::{NoxError, Result};
use crate::variable::Value;

use super::builtin;
use super::contract::{ActionContext, ActionMetadata, ActionProvider};

pub type ActionFactory = Arc<dyn Fn() -> Box<dyn ActionProvider> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    factories: FxHashMap<String, ActionFactory>,
}

impl ActionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `core/*` actions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, uses: &str, factory: F)
    where
        F: Fn() -> Box<dyn ActionProvider> + Send + Sync + 'static,
    {
        self.factories.insert(uses.to_lowercase(), Arc::new(factory));
    }

    pub fn contains(&self, uses: &str) -> bool {
        self.factories.contains_key(&uses.to_lowercase())
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn create(&self, uses: &str) -> Result<Box<dyn ActionProvider>> {
        self.factories
            .get(&uses.to_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| NoxError::ActionNotFound {
                uses: uses.to_string(),
            })
    }

    pub fn metadata(&self, uses: &str) -> Result<ActionMetadata> {
        Ok(self.create(uses)?.discover())
    }

    /// Full lifecycle of one step: defaults, begin, process, end
    ///
    /// The context's state ends as `Success` unless the action set
    /// `Error`; an `Err` from any phase also lands as `Error`.
    #[instrument(skip(self, inputs, ctx), fields(step = %ctx.step_id()))]
    pub async fn invoke(
        &self,
        uses: &str,
        mut inputs: BTreeMap<String, Value>,
        ctx: &mut ActionContext,
    ) -> Result<BTreeMap<String, Value>> {
        let mut provider = self.create(uses)?;
        provider
            .discover()
            .apply_defaults(ctx.step_id(), &mut inputs)?;

        let outcome = async {
            provider.begin(&inputs).await?;
            let outputs = provider.process(ctx).await?;
            Ok::<_, NoxError>(outputs)
        }
        .await;
        let ended = provider.end().await;

        match outcome.and_then(|outputs| ended.map(|_| outputs)) {
            Ok(outputs) => {
                if ctx.state() != ActionState::Error {
                    ctx.set_state(ActionState::Success);
                }
                debug!(uses, outputs = outputs.len(), state = %ctx.state(), "action finished");
                Ok(outputs)
            }
            Err(e) => {
                ctx.set_state(ActionState::Error);
                if ctx.error_message().is_none() {
                    ctx.set_error_message(e.to_string());
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.ids())
            .finish()
    }
}
