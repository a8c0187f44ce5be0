//! Workflow execution
//!
//! Runs a declared workflow step by step through the call executor:
//! - conditions are evaluated against the original payload
//! - each request is the original payload with the step's params merged over it
//! - outputs of earlier steps are injected under `context.<step>`
//! - resource ids recorded by earlier creation steps are injected under
//!   [`RESOURCE_ID_FIELD`]
//! - a failing mandatory step stops the run; optional failures are recorded
//!
//! Workflow steps never use a fallback.

use super::definition::{WorkflowDefinition, WorkflowStep};
use super::report::{StepOutcome, WorkflowReport};
use crate::executor::{CallContext, CallExecutor};
use crate::payload::{into_object, merge_shallow};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Field recorded outputs of earlier steps are injected under
pub const CONTEXT_FIELD: &str = "context";

/// Field a recorded resource id is injected under
pub const RESOURCE_ID_FIELD: &str = "issue_id";

/// Per-execution state, dropped when the run ends
#[derive(Debug)]
struct WorkflowRun {
    run_id: Uuid,
    outputs: HashMap<String, Value>,
    resources: HashMap<String, Value>,
}

impl WorkflowRun {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            outputs: HashMap::new(),
            resources: HashMap::new(),
        }
    }

    /// Build the request payload for `step`
    fn request_for(&self, step: &WorkflowStep, original: &Map<String, Value>) -> Map<String, Value> {
        let mut payload = original.clone();
        merge_shallow(&mut payload, &step.params);

        let found: Vec<(&String, &Value)> = step
            .context_from
            .iter()
            .filter_map(|source| self.outputs.get(source).map(|output| (source, output)))
            .collect();
        if !found.is_empty() {
            let mut context = match payload.remove(CONTEXT_FIELD) {
                Some(Value::Object(existing)) => existing,
                _ => Map::new(),
            };
            for (source, output) in found {
                context.insert(source.clone(), output.clone());
            }
            payload.insert(CONTEXT_FIELD.to_string(), Value::Object(context));
        }

        if let Some(source) = &step.resource_from {
            if let Some(id) = self.resources.get(source) {
                payload.insert(RESOURCE_ID_FIELD.to_string(), id.clone());
            }
        }

        payload
    }

    /// Record a successful step's output and, for creation steps, its resource id
    fn record(&mut self, step: &WorkflowStep, data: &Value) {
        self.outputs.insert(step.name.clone(), data.clone());
        if step.creates_resource() {
            if let Some(id) = resource_id(data) {
                tracing::debug!(step = %step.name, resource_id = %id, "recorded resource");
                self.resources.insert(step.name.clone(), id.clone());
            }
        }
    }
}

/// `id`, or `number` as a secondary identifier
fn resource_id(data: &Value) -> Option<&Value> {
    ["id", "number"]
        .iter()
        .filter_map(|field| data.get(field))
        .find(|value| !value.is_null())
}

/// Executes declared workflows
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    workflows: Arc<BTreeMap<String, WorkflowDefinition>>,
    executor: Arc<CallExecutor>,
    legacy_optional_steps: bool,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<BTreeMap<String, WorkflowDefinition>>,
        executor: Arc<CallExecutor>,
    ) -> Self {
        Self {
            workflows,
            executor,
            legacy_optional_steps: false,
        }
    }

    /// Also treat the legacy step names as optional
    pub fn with_legacy_optional_steps(mut self, enabled: bool) -> Self {
        self.legacy_optional_steps = enabled;
        self
    }

    /// Declared workflows by name
    pub fn workflows(&self) -> &BTreeMap<String, WorkflowDefinition> {
        &self.workflows
    }

    /// Run the workflow `name` with `payload`.
    ///
    /// An unknown name yields a failed report without creating a run.
    pub async fn run(
        &self,
        name: &str,
        payload: Value,
        cancellation: Option<CancellationToken>,
    ) -> WorkflowReport {
        let Some(workflow) = self.workflows.get(name) else {
            tracing::warn!(workflow = %name, "unknown workflow");
            return WorkflowReport::unknown(name);
        };

        let run = WorkflowRun::new();
        let span = tracing::info_span!("workflow", workflow = %name, run_id = %run.run_id);
        self.execute(workflow, run, into_object(payload), cancellation)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        mut run: WorkflowRun,
        original: Map<String, Value>,
        cancellation: Option<CancellationToken>,
    ) -> WorkflowReport {
        let started = Instant::now();
        let mut report = WorkflowReport::started(run.run_id, &workflow.name);
        let mut ctx = CallContext::new(run.run_id.to_string());
        if let Some(token) = cancellation {
            ctx = ctx.with_cancellation(token);
        }

        tracing::info!(steps = workflow.steps.len(), "workflow started");

        for step in &workflow.steps {
            if ctx.is_cancelled() {
                report.fail(format!("Workflow cancelled before step '{}'", step.name));
                break;
            }

            if let Some(condition) = &step.condition {
                if !condition.evaluate(&original) {
                    tracing::debug!(step = %step.name, condition = %condition, "condition not met, skipping");
                    report.skipped_steps.push(step.name.clone());
                    continue;
                }
            }

            let request = run.request_for(step, &original);
            let result = self
                .executor
                .invoke(&step.provider, &step.tool, Value::Object(request), &ctx, None)
                .await;

            if let (true, Some(data)) = (result.success, &result.data) {
                run.record(step, data);
            }

            let optional = step.is_optional(self.legacy_optional_steps);
            let error = result.error.clone();
            let succeeded = result.success;
            report.record(StepOutcome {
                step: step.name.clone(),
                optional,
                result,
            });

            if succeeded {
                continue;
            }
            let error = error.unwrap_or_default();
            if optional {
                tracing::warn!(step = %step.name, error = %error, "optional step failed, continuing");
                continue;
            }
            tracing::warn!(step = %step.name, error = %error, "step failed, stopping workflow");
            report.fail(format!("Step '{}' failed: {}", step.name, error));
            break;
        }

        report.total_duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            success = report.success,
            executed = report.steps_executed,
            failed = report.failed_steps,
            duration_ms = report.total_duration_ms,
            "workflow finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResultCache;
    use crate::capability::{CapabilityProvider, CapabilityRegistry};
    use crate::invoker::ScriptedInvoker;
    use crate::workflow::StepCondition;
    use serde_json::json;

    fn engine(invoker: Arc<ScriptedInvoker>, workflows: Vec<WorkflowDefinition>) -> WorkflowEngine {
        let registry = CapabilityRegistry::from_providers(
            ["p1", "p2", "p3", "p4"].map(|id| CapabilityProvider::new(id, id)),
        );
        let executor = CallExecutor::new(
            Arc::new(registry),
            invoker,
            Arc::new(ResultCache::disabled()),
        );
        let workflows = workflows
            .into_iter()
            .map(|workflow| (workflow.name.clone(), workflow))
            .collect();
        WorkflowEngine::new(Arc::new(workflows), Arc::new(executor))
    }

    #[tokio::test]
    async fn test_unknown_workflow_makes_no_calls() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let engine = engine(invoker.clone(), vec![]);

        let report = engine.run("missing", json!({}), None).await;

        assert!(!report.success);
        assert_eq!(report.steps_executed, 0);
        assert_eq!(invoker.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_condition_uses_original_payload() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let workflow = WorkflowDefinition::new("docs")
            // params would satisfy the condition, but conditions only see the caller's payload
            .with_step(
                WorkflowStep::new("docs", "p1", "fetch")
                    .with_param("library", json!("tokio"))
                    .with_condition(StepCondition::LibrarySpecified),
            )
            .with_step(WorkflowStep::new("answer", "p2", "ask"));
        let engine = engine(invoker.clone(), vec![workflow]);

        let report = engine.run("docs", json!({"description": "x"}), None).await;

        assert!(report.success);
        assert_eq!(report.executed_steps(), vec!["answer"]);
        assert_eq!(report.skipped_steps, vec!["docs"]);
        assert_eq!(invoker.call_count("p1", "fetch"), 0);
    }

    #[tokio::test]
    async fn test_context_and_resource_propagation() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .with_response("p1", "analyze", json!({"summary": "null deref"}))
                .with_response("p2", "create_issue", json!({"id": 42, "url": "http://x"})),
        );
        let workflow = WorkflowDefinition::new("bug_fix")
            .with_step(WorkflowStep::new("analyze", "p1", "analyze"))
            .with_step(WorkflowStep::new("create_issue", "p2", "create_issue"))
            .with_step(
                WorkflowStep::new("fix", "p4", "generate_fix")
                    .with_context_from("analyze")
                    .with_context_from("never_ran"),
            )
            .with_step(WorkflowStep::new("complete", "p2", "update_issue").with_resource_from("create_issue"));
        let engine = engine(invoker.clone(), vec![workflow]);

        let report = engine
            .run("bug_fix", json!({"description": "crash", "context": {"user": "kept"}}), None)
            .await;

        assert!(report.success);
        let calls = invoker.calls();
        assert_eq!(
            calls[2].payload["context"],
            json!({"user": "kept", "analyze": {"summary": "null deref"}})
        );
        assert_eq!(calls[3].payload[RESOURCE_ID_FIELD], json!(42));
    }

    #[tokio::test]
    async fn test_no_context_when_sources_produced_nothing() {
        let invoker = Arc::new(ScriptedInvoker::new().with_failure("p1", "t", "boom"));
        let workflow = WorkflowDefinition::new("wf")
            .with_step(WorkflowStep::new("a", "p1", "t").optional())
            .with_step(WorkflowStep::new("b", "p2", "t").with_context_from("a"));
        let engine = engine(invoker.clone(), vec![workflow]);

        let report = engine.run("wf", json!({"description": "d"}), None).await;

        assert!(report.success);
        assert_eq!(invoker.calls()[1].payload, json!({"description": "d"}));
    }

    #[tokio::test]
    async fn test_resource_falls_back_to_number() {
        let invoker = Arc::new(
            ScriptedInvoker::new().with_response("p2", "open", json!({"number": 7})),
        );
        let workflow = WorkflowDefinition::new("wf")
            .with_step(WorkflowStep::new("open", "p2", "open").with_creates_resource(true))
            .with_step(WorkflowStep::new("close", "p2", "close").with_resource_from("open"));
        let engine = engine(invoker.clone(), vec![workflow]);

        engine.run("wf", json!({}), None).await;

        assert_eq!(invoker.calls()[1].payload[RESOURCE_ID_FIELD], json!(7));
    }

    #[tokio::test]
    async fn test_mandatory_failure_halts() {
        let invoker = Arc::new(ScriptedInvoker::new().with_failure("p2", "t", "boom"));
        let workflow = WorkflowDefinition::new("wf")
            .with_step(WorkflowStep::new("a", "p1", "t"))
            .with_step(WorkflowStep::new("b", "p2", "t"))
            .with_step(WorkflowStep::new("c", "p3", "t"));
        let engine = engine(invoker.clone(), vec![workflow]);

        let report = engine.run("wf", json!({}), None).await;

        assert!(!report.success);
        assert_eq!(report.executed_steps(), vec!["a", "b"]);
        assert_eq!(report.error.as_deref(), Some("Step 'b' failed: p2/t failed: boom"));
        assert_eq!(invoker.call_count("p3", "t"), 0);
    }

    #[tokio::test]
    async fn test_optional_failure_continues() {
        let invoker = Arc::new(ScriptedInvoker::new().with_failure("p2", "t", "boom"));
        let workflow = WorkflowDefinition::new("wf")
            .with_step(WorkflowStep::new("a", "p1", "t"))
            .with_step(WorkflowStep::new("b", "p2", "t").optional())
            .with_step(WorkflowStep::new("c", "p3", "t"));
        let engine = engine(invoker.clone(), vec![workflow]);

        let report = engine.run("wf", json!({}), None).await;

        assert!(report.success);
        assert_eq!(report.steps_executed, 3);
        assert_eq!(report.failed_steps, 1);
        assert!(report.outcome("b").unwrap().optional);
    }

    #[tokio::test]
    async fn test_legacy_optional_names() {
        let invoker = Arc::new(ScriptedInvoker::new().with_failure("p2", "t", "boom"));
        let workflow = WorkflowDefinition::new("wf")
            .with_step(WorkflowStep::new("get_context", "p2", "t"))
            .with_step(WorkflowStep::new("c", "p3", "t"));

        let strict = engine(invoker.clone(), vec![workflow.clone()]);
        assert!(!strict.run("wf", json!({}), None).await.success);

        let legacy = engine(invoker, vec![workflow]).with_legacy_optional_steps(true);
        let report = legacy.run("wf", json!({}), None).await;
        assert!(report.success);
        assert_eq!(report.steps_executed, 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_run() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let workflow = WorkflowDefinition::new("wf")
            .with_step(WorkflowStep::new("a", "p1", "t"));
        let engine = engine(invoker.clone(), vec![workflow]);
        let token = CancellationToken::new();
        token.cancel();

        let report = engine.run("wf", json!({}), Some(token)).await;

        assert!(!report.success);
        assert_eq!(report.steps_executed, 0);
        assert_eq!(invoker.total_calls(), 0);
    }
}
