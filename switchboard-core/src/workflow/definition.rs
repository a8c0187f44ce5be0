//! Declared workflows and their steps

use crate::payload::{has_text, is_flag_set};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Step names treated as optional when `legacy_optional_steps` is enabled
pub const LEGACY_OPTIONAL_STEPS: [&str; 3] = ["get_context", "get_library_docs", "search_docs"];

/// A named, ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name (filled from the config key when omitted)
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Keywords hinting when the workflow applies (informational)
    #[serde(default, alias = "trigger_keywords")]
    pub triggers: Vec<String>,

    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Look up a step by name
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Structural problems: duplicate step names and references to steps that
    /// do not run earlier in the workflow.
    pub fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut earlier: HashSet<&str> = HashSet::new();

        for step in &self.steps {
            for source in &step.context_from {
                if !earlier.contains(source.as_str()) {
                    issues.push(format!(
                        "workflow '{}' step '{}' takes context from '{}', which is not an earlier step",
                        self.name, step.name, source
                    ));
                }
            }
            if let Some(source) = &step.resource_from {
                if !earlier.contains(source.as_str()) {
                    issues.push(format!(
                        "workflow '{}' step '{}' takes a resource from '{}', which is not an earlier step",
                        self.name, step.name, source
                    ));
                }
            }
            if !earlier.insert(step.name.as_str()) {
                issues.push(format!(
                    "workflow '{}' declares step '{}' more than once",
                    self.name, step.name
                ));
            }
        }

        issues
    }
}

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow
    pub name: String,

    #[serde(alias = "mcp")]
    pub provider: String,

    pub tool: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    /// Gate evaluated against the workflow's original payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,

    /// A failure of this step does not stop the workflow
    #[serde(default)]
    pub optional: bool,

    /// Earlier steps whose outputs are injected under `context`
    #[serde(default, alias = "use_context_from", skip_serializing_if = "Vec::is_empty")]
    pub context_from: Vec<String>,

    /// Earlier step whose created resource id is injected
    #[serde(
        default,
        alias = "use_issue_from",
        alias = "issue_from",
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_from: Option<String>,

    /// Whether the tool creates a trackable resource; inferred from a
    /// `create_` tool name prefix when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creates_resource: Option<bool>,
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, provider: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            tool: tool.into(),
            params: Map::new(),
            condition: None,
            optional: false,
            context_from: Vec::new(),
            resource_from: None,
            creates_resource: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_context_from(mut self, step: impl Into<String>) -> Self {
        self.context_from.push(step.into());
        self
    }

    pub fn with_resource_from(mut self, step: impl Into<String>) -> Self {
        self.resource_from = Some(step.into());
        self
    }

    pub fn with_creates_resource(mut self, creates: bool) -> Self {
        self.creates_resource = Some(creates);
        self
    }

    /// Whether a failure of this step is tolerated
    pub fn is_optional(&self, legacy_names: bool) -> bool {
        self.optional || (legacy_names && LEGACY_OPTIONAL_STEPS.contains(&self.name.as_str()))
    }

    /// Whether a successful result should be scanned for a resource id
    pub fn creates_resource(&self) -> bool {
        self.creates_resource
            .unwrap_or_else(|| self.tool.starts_with("create_"))
    }
}

/// Closed vocabulary of step gates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepCondition {
    /// Payload names a `library`
    LibrarySpecified,
    /// Payload names a `repository` or `codebase`
    RepositorySpecified,
    /// `needs_docs` is set or a library is named
    DocsRequested,
    /// `context_needed` is set or a repository is named
    ContextNeeded,
    Always,
    /// Unrecognised name; always true
    Unknown(String),
}

impl StepCondition {
    /// Evaluate against the workflow's original payload
    pub fn evaluate(&self, payload: &Map<String, Value>) -> bool {
        match self {
            StepCondition::LibrarySpecified => has_text(payload, "library"),
            StepCondition::RepositorySpecified => {
                has_text(payload, "repository") || has_text(payload, "codebase")
            }
            StepCondition::DocsRequested => {
                is_flag_set(payload, "needs_docs") || StepCondition::LibrarySpecified.evaluate(payload)
            }
            StepCondition::ContextNeeded => {
                is_flag_set(payload, "context_needed")
                    || StepCondition::RepositorySpecified.evaluate(payload)
            }
            StepCondition::Always | StepCondition::Unknown(_) => true,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepCondition::LibrarySpecified => "library_specified",
            StepCondition::RepositorySpecified => "repository_specified",
            StepCondition::DocsRequested => "docs_requested",
            StepCondition::ContextNeeded => "context_needed",
            StepCondition::Always => "always",
            StepCondition::Unknown(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, StepCondition::Unknown(_))
    }
}

impl From<String> for StepCondition {
    fn from(name: String) -> Self {
        match name.trim() {
            "library_specified" | "has_library" => StepCondition::LibrarySpecified,
            "repository_specified" | "has_repository" | "has_codebase" => {
                StepCondition::RepositorySpecified
            }
            "docs_requested" | "needs_docs" => StepCondition::DocsRequested,
            "context_needed" | "needs_context" => StepCondition::ContextNeeded,
            "always" | "" => StepCondition::Always,
            _ => StepCondition::Unknown(name),
        }
    }
}

impl From<&str> for StepCondition {
    fn from(name: &str) -> Self {
        StepCondition::from(name.to_string())
    }
}

impl From<StepCondition> for String {
    fn from(condition: StepCondition) -> Self {
        condition.as_str().to_string()
    }
}

impl std::fmt::Display for StepCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing entry for a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub steps: Vec<String>,
}

impl From<&WorkflowDefinition> for WorkflowSummary {
    fn from(workflow: &WorkflowDefinition) -> Self {
        Self {
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            triggers: workflow.triggers.clone(),
            steps: workflow.steps.iter().map(|step| step.name.clone()).collect(),
        }
    }
}
