//! Routing rule definitions

use crate::context::TaskContext;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// An ordered routing rule: condition plus action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Rule name (filled from the declaration index when omitted)
    #[serde(default)]
    pub name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// When the rule applies
    #[serde(default)]
    pub condition: RuleCondition,

    /// What to call when it does
    pub action: RuleAction,
}

impl RoutingRule {
    /// Rule routing to a single tool
    pub fn single(name: impl Into<String>, call: SingleCall) -> Self {
        Self {
            name: name.into(),
            description: None,
            condition: RuleCondition::default(),
            action: RuleAction::Single(call),
        }
    }

    /// Rule routing to an ordered sequence of tools
    pub fn sequence(name: impl Into<String>, steps: Vec<SequenceStep>) -> Self {
        Self {
            name: name.into(),
            description: None,
            condition: RuleCondition::default(),
            action: RuleAction::Sequence { sequence: steps },
        }
    }

    /// Set the condition
    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Predicate over a task. Unset fields always match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Task types this rule accepts
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub task_type: Option<Vec<String>>,

    /// Complexity labels; only checked when the task supplies one
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub complexity: Option<Vec<String>>,

    /// Required value of the task's context flag (absent flag reads as false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_required: Option<bool>,

    /// Targets; only checked when the task supplies one
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<Vec<String>>,
}

impl RuleCondition {
    /// Restrict to the given task types
    pub fn task_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_type = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given complexity labels
    pub fn complexities<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.complexity = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    /// Require the context flag to equal `required`
    pub fn context_required(mut self, required: bool) -> Self {
        self.context_required = Some(required);
        self
    }

    /// Restrict to the given targets
    pub fn targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    /// Evaluate against a task
    pub fn matches(&self, task: &TaskContext) -> bool {
        if let Some(types) = &self.task_type {
            if !types.contains(&task.task_type) {
                return false;
            }
        }

        if let (Some(labels), Some(complexity)) = (&self.complexity, &task.complexity) {
            if !labels.contains(complexity) {
                return false;
            }
        }

        if let Some(required) = self.context_required {
            if task.context_required.unwrap_or(false) != required {
                return false;
            }
        }

        if let (Some(targets), Some(target)) = (&self.target, &task.target) {
            if !targets.contains(target) {
                return false;
            }
        }

        true
    }

    /// Whether a rule with this condition could serve `task_type`
    pub fn accepts_task_type(&self, task_type: &str) -> bool {
        self.task_type
            .as_ref()
            .is_none_or(|types| types.iter().any(|t| t == task_type))
    }
}

/// Accept either `"x"` or `["x", "y"]`
fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(
        Option::<OneOrMany>::deserialize(deserializer)?.map(|value| match value {
            OneOrMany::One(single) => vec![single],
            OneOrMany::Many(many) => many,
        }),
    )
}

/// What a matched rule does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleAction {
    /// Ordered calls, short-circuiting on the first failure
    Sequence { sequence: Vec<SequenceStep> },

    /// One call with an optional fallback
    Single(SingleCall),
}

impl RuleAction {
    /// Every `(provider, tool)` pair this action may call, fallbacks included
    pub fn references(&self) -> Vec<(&str, &str)> {
        match self {
            RuleAction::Single(call) => {
                let mut refs = vec![(call.provider.as_str(), call.tool.as_str())];
                if let Some(fallback) = &call.fallback {
                    refs.push((fallback.provider.as_str(), fallback.tool.as_str()));
                }
                refs
            }
            RuleAction::Sequence { sequence } => sequence
                .iter()
                .map(|step| (step.provider.as_str(), step.tool.as_str()))
                .collect(),
        }
    }
}

/// A single routed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleCall {
    #[serde(alias = "mcp")]
    pub provider: String,

    pub tool: String,

    /// Fixed parameters merged over the task payload
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    /// Tried once if the primary call fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackCall>,
}

impl SingleCall {
    pub fn new(provider: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tool: tool.into(),
            params: Map::new(),
            fallback: None,
        }
    }

    /// Add a fixed parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Set the fallback
    pub fn with_fallback(mut self, fallback: FallbackCall) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Alternate call for a failed primary. Has no fallback of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackCall {
    #[serde(alias = "mcp")]
    pub provider: String,

    pub tool: String,

    /// Merged over the original payload
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl FallbackCall {
    pub fn new(provider: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tool: tool.into(),
            params: Map::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// One call inside a sequence action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    #[serde(alias = "mcp")]
    pub provider: String,

    pub tool: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    /// Inject the previous step's data as `previous_result`
    #[serde(default)]
    pub use_previous_result: bool,

    /// Merge this step's object data into the payload of later steps
    #[serde(default)]
    pub pass_result_to_next: bool,
}

impl SequenceStep {
    pub fn new(provider: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tool: tool.into(),
            params: Map::new(),
            use_previous_result: false,
            pass_result_to_next: false,
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Receive the previous step's data
    pub fn use_previous_result(mut self) -> Self {
        self.use_previous_result = true;
        self
    }

    /// Feed this step's data to later steps
    pub fn pass_result_to_next(mut self) -> Self {
        self.pass_result_to_next = true;
        self
    }
}
