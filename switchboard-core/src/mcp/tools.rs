//! Tool surface exposed over MCP
//!
//! Five tools map one-to-one onto the [`Switchboard`](crate::Switchboard)
//! entry points. Argument structs are deserialized from `tools/call`
//! arguments.

use super::protocol::McpTool;
use crate::context::TaskContext;
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub const ROUTE_TASK: &str = "route_task";
pub const EXECUTE_WORKFLOW: &str = "execute_workflow";
pub const LIST_AVAILABLE_MCPS: &str = "list_available_mcps";
pub const GET_ROUTING_RULES: &str = "get_routing_rules";
pub const LIST_WORKFLOWS: &str = "list_workflows";

/// Arguments of `route_task`
#[derive(Debug, Clone, Deserialize)]
pub struct RouteTaskArgs {
    pub task_type: String,
    pub description: String,
    #[serde(default)]
    pub complexity: Option<String>,
    #[serde(default)]
    pub context_required: Option<bool>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl From<RouteTaskArgs> for TaskContext {
    fn from(args: RouteTaskArgs) -> Self {
        let mut task = TaskContext::new(args.task_type, args.description);
        task.complexity = args.complexity;
        task.context_required = args.context_required;
        task.target = args.target;
        task.metadata = args.metadata;
        if let Some(id) = args.correlation_id {
            task.correlation_id = id;
        }
        task
    }
}

/// Arguments of `execute_workflow`; any extra field becomes part of the payload
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteWorkflowArgs {
    #[serde(alias = "workflow_name")]
    pub workflow: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ExecuteWorkflowArgs {
    /// Payload handed to the workflow's steps
    pub fn payload(&self) -> Value {
        let mut payload = self.fields.clone();
        if let Some(description) = &self.description {
            payload.insert("description".to_string(), Value::String(description.clone()));
        }
        Value::Object(payload)
    }
}

/// Arguments of `list_available_mcps`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMcpsArgs {
    #[serde(default, alias = "capability_filter")]
    pub capability: Option<String>,
}

/// Arguments of `get_routing_rules`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetRoutingRulesArgs {
    #[serde(default)]
    pub task_type: Option<String>,
}

/// Definitions advertised by `tools/list`
pub fn tool_definitions() -> Vec<McpTool> {
    vec![
        McpTool {
            name: ROUTE_TASK.to_string(),
            description: "Route a task to the best provider tool using the configured routing rules"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task_type": { "type": "string", "description": "Task category, e.g. research or code_generation" },
                    "description": { "type": "string", "description": "What needs to be done" },
                    "complexity": { "type": "string", "description": "Optional complexity label" },
                    "context_required": { "type": "boolean", "description": "Whether codebase or documentation context is needed" },
                    "target": { "type": "string", "description": "Optional target language or platform" },
                    "metadata": { "type": "object", "description": "Extra fields passed through to the tool" }
                },
                "required": ["task_type", "description"]
            }),
        },
        McpTool {
            name: EXECUTE_WORKFLOW.to_string(),
            description: "Run a declared multi-step workflow".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workflow": { "type": "string", "description": "Workflow name" },
                    "description": { "type": "string", "description": "Task description passed to every step" }
                },
                "required": ["workflow"],
                "additionalProperties": true
            }),
        },
        McpTool {
            name: LIST_AVAILABLE_MCPS.to_string(),
            description: "List capability providers and their tools".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "capability": { "type": "string", "description": "Only providers with this capability tag" }
                }
            }),
        },
        McpTool {
            name: GET_ROUTING_RULES.to_string(),
            description: "Show routing rules in priority order".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task_type": { "type": "string", "description": "Only rules that could serve this task type" }
                }
            }),
        },
        McpTool {
            name: LIST_WORKFLOWS.to_string(),
            description: "List declared workflows".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
    ]
}
