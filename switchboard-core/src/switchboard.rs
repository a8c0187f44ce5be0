//! The Switchboard facade
//!
//! Owns the registry, rules, workflows and call executor built from one
//! [`SwitchboardConfig`] and exposes the entry points used by the MCP surface
//! and the CLI:
//! - [`Switchboard::route_task`]
//! - [`Switchboard::execute_workflow`]
//! - [`Switchboard::list_available_mcps`]
//! - [`Switchboard::get_routing_rules`]
//! - [`Switchboard::list_workflows`]
//!
//! Definitions are immutable after construction.

use crate::cache::{Clock, ResultCache};
use crate::capability::{CapabilityRegistry, ProviderSummary};
use crate::config::{FallbackStrategy, IntegrationSettings, SwitchboardConfig};
use crate::context::{CallResult, TaskContext};
use crate::error::Result;
use crate::executor::{CallContext, CallExecutor};
use crate::invoker::{Invoker, StdioMcpInvoker};
use crate::payload::merge_shallow;
use crate::routing::{RoutingRule, RuleAction, RuleMatcher, SequenceExecutor};
use crate::workflow::{WorkflowEngine, WorkflowReport, WorkflowSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// A provider/tool pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    pub provider: String,
    pub tool: String,
}

impl RouteTarget {
    pub fn new(provider: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tool: tool.into(),
        }
    }
}

/// Where a routed task went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutedTo {
    Sequence { sequence: Vec<RouteTarget> },
    Single(RouteTarget),
}

/// Outcome of [`Switchboard::route_task`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteReport {
    pub success: bool,

    pub correlation_id: String,

    /// Name of the matched rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    /// Provider/tool that produced the result (the fallback's when it ran)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routed_to: Option<RoutedTo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub execution_time_ms: u64,

    #[serde(default)]
    pub cached: bool,

    #[serde(default)]
    pub used_fallback: bool,
}

impl RouteReport {
    fn no_match(task: &TaskContext) -> Self {
        Self {
            success: false,
            correlation_id: task.correlation_id.clone(),
            rule: None,
            routed_to: None,
            result: None,
            error: Some(format!(
                "No routing rule matched task type '{}'",
                task.task_type
            )),
            execution_time_ms: 0,
            cached: false,
            used_fallback: false,
        }
    }

    fn from_call(task: &TaskContext, rule: &RoutingRule, routed_to: RoutedTo, call: CallResult) -> Self {
        Self {
            success: call.success,
            correlation_id: task.correlation_id.clone(),
            rule: Some(rule.name.clone()),
            routed_to: Some(routed_to),
            result: call.data,
            error: call.error,
            execution_time_ms: call.execution_time_ms,
            cached: call.cached,
            used_fallback: call.used_fallback,
        }
    }
}

/// Routing and workflow engine
pub struct Switchboard {
    registry: Arc<CapabilityRegistry>,
    matcher: RuleMatcher,
    engine: WorkflowEngine,
    executor: Arc<CallExecutor>,
    fallback_strategies: BTreeMap<String, FallbackStrategy>,
    settings: IntegrationSettings,
}

impl std::fmt::Debug for Switchboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchboard")
            .field("providers", &self.registry.len())
            .field("rules", &self.matcher.len())
            .field("workflows", &self.engine.workflows().len())
            .finish()
    }
}

impl Switchboard {
    /// Create a builder
    pub fn builder(config: SwitchboardConfig) -> SwitchboardBuilder {
        SwitchboardBuilder::new(config)
    }

    /// Build with an explicit invoker and the configured cache
    pub fn new(config: SwitchboardConfig, invoker: Arc<dyn Invoker>) -> Self {
        SwitchboardBuilder::new(config).invoker(invoker).build()
    }

    /// Load configuration from `SWITCHBOARD_CONFIG` and talk to providers over stdio
    pub fn from_env() -> Result<Self> {
        Ok(SwitchboardBuilder::new(SwitchboardConfig::load()?).build())
    }

    /// Route a task to the first matching rule's action.
    ///
    /// Never fails: a routing miss or a failed call is reported in the
    /// returned [`RouteReport`].
    pub async fn route_task(
        &self,
        task: TaskContext,
        cancellation: Option<CancellationToken>,
    ) -> RouteReport {
        let span = tracing::info_span!(
            "route_task",
            correlation_id = %task.correlation_id,
            task_type = %task.task_type
        );
        self.route(task, cancellation).instrument(span).await
    }

    async fn route(&self, task: TaskContext, cancellation: Option<CancellationToken>) -> RouteReport {
        let Some(rule) = self.matcher.find_match(&task) else {
            tracing::warn!("no routing rule matched");
            return RouteReport::no_match(&task);
        };
        tracing::info!(rule = %rule.name, "routing rule matched");

        let mut ctx = CallContext::new(task.correlation_id.clone());
        if let Some(token) = cancellation {
            ctx = ctx.with_cancellation(token);
        }
        let mut payload = task.to_payload();

        let report = match &rule.action {
            RuleAction::Single(call) => {
                merge_shallow(&mut payload, &call.params);
                let result = self
                    .executor
                    .invoke(
                        &call.provider,
                        &call.tool,
                        Value::Object(payload),
                        &ctx,
                        call.fallback.as_ref(),
                    )
                    .await;
                let routed_to = RoutedTo::Single(RouteTarget::new(&result.provider, &result.tool));
                RouteReport::from_call(&task, rule, routed_to, result)
            }
            RuleAction::Sequence { sequence } => {
                let result = SequenceExecutor::new(&self.executor)
                    .run(sequence, payload, &ctx)
                    .await;
                let routed_to = RoutedTo::Sequence {
                    sequence: sequence
                        .iter()
                        .map(|step| RouteTarget::new(&step.provider, &step.tool))
                        .collect(),
                };
                RouteReport::from_call(&task, rule, routed_to, result)
            }
        };

        tracing::info!(
            success = report.success,
            cached = report.cached,
            used_fallback = report.used_fallback,
            execution_time_ms = report.execution_time_ms,
            "task routed"
        );
        report
    }

    /// Run a declared workflow
    pub async fn execute_workflow(
        &self,
        name: &str,
        payload: Value,
        cancellation: Option<CancellationToken>,
    ) -> WorkflowReport {
        self.engine.run(name, payload, cancellation).await
    }

    /// Providers, optionally only those carrying `capability`
    pub fn list_available_mcps(&self, capability: Option<&str>) -> Vec<ProviderSummary> {
        self.registry.summaries(capability)
    }

    /// Rules in priority order, optionally only those that could serve `task_type`
    pub fn get_routing_rules(&self, task_type: Option<&str>) -> Vec<&RoutingRule> {
        match task_type {
            Some(task_type) => self.matcher.rules_for_task_type(task_type),
            None => self.matcher.rules().iter().collect(),
        }
    }

    /// Declared workflows
    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.engine
            .workflows()
            .values()
            .map(WorkflowSummary::from)
            .collect()
    }

    /// Advisory fallback metadata from configuration
    pub fn fallback_strategies(&self) -> &BTreeMap<String, FallbackStrategy> {
        &self.fallback_strategies
    }

    pub fn settings(&self) -> &IntegrationSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        self.executor.cache()
    }
}

/// Builder for [`Switchboard`]
pub struct SwitchboardBuilder {
    config: SwitchboardConfig,
    invoker: Option<Arc<dyn Invoker>>,
    cache: Option<Arc<ResultCache>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SwitchboardBuilder {
    pub fn new(config: SwitchboardConfig) -> Self {
        Self {
            config,
            invoker: None,
            cache: None,
            clock: None,
        }
    }

    /// Invocation channel (defaults to a [`StdioMcpInvoker`] over the configured providers)
    pub fn invoker(mut self, invoker: Arc<dyn Invoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Share an existing cache instead of creating one from the settings
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Clock for the cache created from the settings
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Switchboard {
        let SwitchboardConfig {
            providers,
            routing_rules,
            workflows,
            fallback_strategies,
            integration_settings: settings,
        } = self.config;

        let invoker = self
            .invoker
            .unwrap_or_else(|| Arc::new(StdioMcpInvoker::from_providers(providers.values())));
        let cache = self.cache.unwrap_or_else(|| {
            let config = settings.cache_config();
            Arc::new(match self.clock {
                Some(clock) => ResultCache::with_clock(config, clock),
                None => ResultCache::new(config),
            })
        });

        let registry = Arc::new(CapabilityRegistry::from_map(providers));
        let mut executor = CallExecutor::new(registry.clone(), invoker, cache)
            .with_max_concurrent_calls(settings.max_concurrent_calls);
        if let Some(timeout) = settings.default_timeout() {
            executor = executor.with_default_timeout(timeout);
        }
        let executor = Arc::new(executor);

        let engine = WorkflowEngine::new(Arc::new(workflows), executor.clone())
            .with_legacy_optional_steps(settings.legacy_optional_steps);

        tracing::debug!(
            providers = registry.len(),
            rules = routing_rules.len(),
            workflows = engine.workflows().len(),
            "switchboard ready"
        );

        Switchboard {
            registry,
            matcher: RuleMatcher::new(routing_rules),
            engine,
            executor,
            fallback_strategies,
            settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::ScriptedInvoker;
    use serde_json::json;

    const CONFIG: &str = r#"
[providers.search]
capabilities = ["research"]

[providers.docs]
capabilities = ["documentation"]

[[routing_rules]]
name = "docs_pipeline"
condition = { task_type = "docs" }
action = { sequence = [
  { provider = "docs", tool = "resolve", pass_result_to_next = true },
  { provider = "docs", tool = "fetch", use_previous_result = true },
] }

[[routing_rules]]
name = "research"
condition = { task_type = ["research"] }
action = { provider = "search", tool = "ask", params = { depth = "deep" } }

[workflows.lookup]
steps = [{ name = "fetch", provider = "docs", tool = "fetch" }]
"#;

    fn switchboard(invoker: Arc<ScriptedInvoker>) -> Switchboard {
        let config = SwitchboardConfig::from_toml_str(CONFIG).unwrap();
        Switchboard::new(config, invoker)
    }

    #[tokio::test]
    async fn test_route_single_merges_params() {
        let invoker = Arc::new(ScriptedInvoker::new().with_response("search", "ask", json!("42")));
        let switchboard = switchboard(invoker.clone());

        let task = TaskContext::new("research", "meaning of life").with_correlation_id("req-1");
        let report = switchboard.route_task(task, None).await;

        assert!(report.success);
        assert_eq!(report.correlation_id, "req-1");
        assert_eq!(report.rule.as_deref(), Some("research"));
        assert_eq!(report.routed_to, Some(RoutedTo::Single(RouteTarget::new("search", "ask"))));
        assert_eq!(report.result, Some(json!("42")));
        assert_eq!(
            invoker.calls()[0].payload,
            json!({"description": "meaning of life", "task_type": "research", "depth": "deep"})
        );
    }

    #[tokio::test]
    async fn test_route_sequence() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let switchboard = switchboard(invoker.clone());

        let report = switchboard.route_task(TaskContext::new("docs", "tokio"), None).await;

        assert!(report.success);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["routed_to"]["sequence"][1]["tool"], "fetch");
        assert_eq!(report.result.as_ref().and_then(Value::as_array).map(Vec::len), Some(2));
        assert_eq!(invoker.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_route_no_match() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let switchboard = switchboard(invoker.clone());

        let report = switchboard.route_task(TaskContext::new("deploy", "ship it"), None).await;

        assert!(!report.success);
        assert_eq!(
            report.error.as_deref(),
            Some("No routing rule matched task type 'deploy'")
        );
        assert_eq!(invoker.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_introspection() {
        let switchboard = switchboard(Arc::new(ScriptedInvoker::new()));

        let research = switchboard.list_available_mcps(Some("research"));
        assert_eq!(research.len(), 1);
        assert_eq!(switchboard.list_available_mcps(None).len(), 2);

        let rules: Vec<_> = switchboard
            .get_routing_rules(Some("research"))
            .into_iter()
            .map(|rule| rule.name.clone())
            .collect();
        assert_eq!(rules, vec!["research"]);
        assert_eq!(switchboard.get_routing_rules(None).len(), 2);

        let workflows = switchboard.list_workflows();
        assert_eq!(workflows[0].name, "lookup");
        assert_eq!(workflows[0].steps, vec!["fetch"]);
    }

    #[tokio::test]
    async fn test_execute_workflow() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let switchboard = switchboard(invoker.clone());

        let report = switchboard
            .execute_workflow("lookup", json!({"description": "x"}), None)
            .await;

        assert!(report.success);
        assert_eq!(report.steps_executed, 1);
        assert_eq!(invoker.call_count("docs", "fetch"), 1);
    }
}
