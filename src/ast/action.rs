//! Action (step) types
//!
//! An `Action` is one step of a job: the `uses` identifier of an action
//! provider, its inputs (`with:`), optional `if`, `validate` assertions,
//! display templates and execution flags. Inputs start as literals or
//! `${{ }}` references and are rewritten in place as resolution succeeds.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::variable::Value;

/// Lifecycle of a single action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionState {
    #[default]
    NotStarted,
    Running,
    Success,
    Error,
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionState::NotStarted => "not-started",
            ActionState::Running => "running",
            ActionState::Success => "success",
            ActionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// One `with:` entry; the map key is the input id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionInput {
    /// Literal, reference text, or the value it resolved to
    pub default: Value,
}

impl ActionInput {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            default: value.into(),
        }
    }
}

/// Display templates (`display:` block)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DisplayMessages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Shown when the `if` condition skips the step/job
    #[serde(default, alias = "if", skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<String>,
}

impl DisplayMessages {
    pub fn is_empty(&self) -> bool {
        self.success.is_none() && self.error.is_none() && self.if_condition.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
    That,
    AndThat,
    OrThat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub kind: AssertionKind,
    pub expression: String,
}

/// `validate:` either as one map or as a list of single-entry maps
#[derive(Deserialize)]
#[serde(untagged)]
enum ValidationRaw {
    Map(BTreeMap<AssertionKind, String>),
    List(Vec<BTreeMap<AssertionKind, String>>),
}

/// Post-condition assertions, folded left (`and-that` → AND, `or-that` → OR)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ValidationRaw", into = "Vec<BTreeMap<AssertionKind, String>>")]
pub struct Validation(pub Vec<Assertion>);

impl Validation {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assertion> {
        self.0.iter()
    }
}

impl From<ValidationRaw> for Validation {
    fn from(raw: ValidationRaw) -> Self {
        let maps = match raw {
            ValidationRaw::Map(map) => vec![map],
            ValidationRaw::List(list) => list,
        };
        Validation(
            maps.into_iter()
                .flatten()
                .map(|(kind, expression)| Assertion { kind, expression })
                .collect(),
        )
    }
}

impl From<Validation> for Vec<BTreeMap<AssertionKind, String>> {
    fn from(v: Validation) -> Self {
        v.0.into_iter()
            .map(|a| BTreeMap::from([(a.kind, a.expression)]))
            .collect()
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A workflow step bound to an action provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Action {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// 1-based position across the whole workflow (assigned on load)
    #[serde(default)]
    pub sequence: usize,
    #[serde(default)]
    pub job_id: String,
    /// Action provider identifier (e.g. `core/echo@v1`)
    pub uses: String,
    #[serde(default, rename = "with")]
    pub inputs: BTreeMap<String, ActionInput>,
    #[serde(default, skip_serializing_if = "Validation::is_empty")]
    pub validate: Validation,
    #[serde(default, skip_serializing_if = "DisplayMessages::is_empty")]
    pub display: DisplayMessages,
    #[serde(default, skip_serializing_if = "is_false")]
    pub run_at_server: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub continue_on_error: bool,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<String>,
    #[serde(default)]
    pub state: ActionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Action {
    pub fn new(id: impl Into<String>, uses: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            sequence: 0,
            job_id: String::new(),
            uses: uses.into(),
            inputs: BTreeMap::new(),
            validate: Validation::default(),
            display: DisplayMessages::default(),
            run_at_server: false,
            continue_on_error: false,
            if_condition: None,
            state: ActionState::NotStarted,
            error_message: None,
        }
    }

    /// Builder-style input
    pub fn with_input(mut self, id: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(id.into(), ActionInput::new(value));
        self
    }

    /// Current input values (possibly still holding references)
    pub fn input_values(&self) -> BTreeMap<String, Value> {
        self.inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.default.clone()))
            .collect()
    }

    pub fn set_state(&mut self, state: ActionState) {
        self.state = state;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = ActionState::Error;
        self.error_message = Some(message.into());
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}
