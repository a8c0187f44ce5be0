//! Per-call value types: the task being routed and the outcome of one call

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// An ad-hoc task submitted for routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Task category (e.g. "research", "code_generation")
    pub task_type: String,

    /// Free-text description
    pub description: String,

    /// Optional complexity label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,

    /// Whether the task needs codebase or documentation context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_required: Option<bool>,

    /// Optional target (language, platform, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Extra caller-supplied fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Id threaded through logs for this request
    #[serde(default = "new_correlation_id")]
    pub correlation_id: String,
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

impl TaskContext {
    /// Create a task with a fresh correlation id
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            description: description.into(),
            complexity: None,
            context_required: None,
            target: None,
            metadata: Map::new(),
            correlation_id: new_correlation_id(),
        }
    }

    /// Set the complexity
    pub fn with_complexity(mut self, complexity: impl Into<String>) -> Self {
        self.complexity = Some(complexity.into());
        self
    }

    /// Set the context-required flag
    pub fn with_context_required(mut self, required: bool) -> Self {
        self.context_required = Some(required);
        self
    }

    /// Set the target
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Add a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Use a caller-chosen correlation id
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Base payload sent to the routed tool, before rule params are merged.
    ///
    /// Carries `description` and `task_type`, the optional fields that were
    /// supplied, and `metadata` when non-empty.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("description".into(), Value::String(self.description.clone()));
        payload.insert("task_type".into(), Value::String(self.task_type.clone()));
        if let Some(complexity) = &self.complexity {
            payload.insert("complexity".into(), Value::String(complexity.clone()));
        }
        if let Some(required) = self.context_required {
            payload.insert("context_required".into(), Value::Bool(required));
        }
        if let Some(target) = &self.target {
            payload.insert("target".into(), Value::String(target.clone()));
        }
        if !self.metadata.is_empty() {
            payload.insert("metadata".into(), Value::Object(self.metadata.clone()));
        }
        payload
    }
}

/// Outcome of one provider call (or of a whole sequence)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Whether the call succeeded
    pub success: bool,

    /// Returned data on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock duration in milliseconds (0 for cache hits)
    pub execution_time_ms: u64,

    /// Provider that produced the result
    pub provider: String,

    /// Tool that produced the result
    pub tool: String,

    /// Served from the result cache
    #[serde(default)]
    pub cached: bool,

    /// Produced by the rule's fallback after the primary call failed
    #[serde(default)]
    pub used_fallback: bool,
}

impl CallResult {
    /// Successful call
    pub fn success(
        provider: impl Into<String>,
        tool: impl Into<String>,
        data: Value,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time_ms: elapsed.as_millis() as u64,
            provider: provider.into(),
            tool: tool.into(),
            cached: false,
            used_fallback: false,
        }
    }

    /// Failed call
    pub fn failure(
        provider: impl Into<String>,
        tool: impl Into<String>,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time_ms: elapsed.as_millis() as u64,
            provider: provider.into(),
            tool: tool.into(),
            cached: false,
            used_fallback: false,
        }
    }

    /// Cache hit: successful, zero execution time
    pub fn cache_hit(provider: impl Into<String>, tool: impl Into<String>, data: Value) -> Self {
        Self {
            cached: true,
            ..Self::success(provider, tool, data, Duration::ZERO)
        }
    }

    /// Mark as produced by a fallback
    pub fn via_fallback(mut self) -> Self {
        self.used_fallback = true;
        self
    }

    /// Execution time as a `Duration`
    pub fn execution_time(&self) -> Duration {
        Duration::from_millis(self.execution_time_ms)
    }
}
