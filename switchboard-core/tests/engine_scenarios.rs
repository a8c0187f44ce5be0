//! End-to-end tests for routing and workflows
//!
//! Each test builds a Switchboard from a configuration document, drives it
//! through the public entry points and checks which provider calls happened.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::prelude::*;

const CONFIG: &str = r#"
[providers.p1]
name = "Research"
capabilities = ["research"]

[providers.p2]
name = "Tracker"
capabilities = ["issues"]

[providers.p3]
name = "Codebase"
capabilities = ["context"]

[providers.p4]
name = "Coder"
capabilities = ["code"]

[[routing_rules]]
name = "research"
condition = { task_type = ["research"] }
action = { provider = "p1", tool = "ask", fallback = { provider = "p2", tool = "ask_alt" } }

[workflows.bug_fix]
description = "Analyze, track, fix and close a bug"
triggers = ["bug", "fix"]

[[workflows.bug_fix.steps]]
name = "analyze"
provider = "p1"
tool = "t1"

[[workflows.bug_fix.steps]]
name = "create_issue"
provider = "p2"
tool = "t2"
creates_resource = true

[[workflows.bug_fix.steps]]
name = "get_context"
provider = "p3"
tool = "t3"
condition = "context_needed"
optional = true

[[workflows.bug_fix.steps]]
name = "generate_fix"
provider = "p4"
tool = "t4"
context_from = ["analyze"]

[[workflows.bug_fix.steps]]
name = "complete"
provider = "p2"
tool = "t2"
issue_from = "create_issue"
"#;

fn switchboard(invoker: Arc<ScriptedInvoker>, clock: Arc<ManualClock>) -> Switchboard {
    let config = SwitchboardConfig::from_toml_str(CONFIG).expect("valid config");
    Switchboard::builder(config)
        .invoker(invoker)
        .clock(clock)
        .build()
}

#[tokio::test]
async fn test_rejected_primary_falls_back() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .with_failure("p1", "ask", "rate limited")
            .with_response("p2", "ask_alt", json!({"answer": "use an LRU"})),
    );
    let switchboard = switchboard(invoker.clone(), Arc::new(ManualClock::default()));

    let report = switchboard
        .route_task(TaskContext::new("research", "best caching strategies"), None)
        .await;

    assert!(report.success);
    assert!(report.used_fallback);
    assert_eq!(
        report.routed_to,
        Some(RoutedTo::Single(RouteTarget::new("p2", "ask_alt")))
    );
    assert_eq!(report.result, Some(json!({"answer": "use an LRU"})));
    assert_eq!(invoker.call_count("p1", "ask"), 1);
    assert_eq!(invoker.call_count("p2", "ask_alt"), 1);
}

#[tokio::test]
async fn test_failed_creation_halts_workflow() {
    let invoker = Arc::new(ScriptedInvoker::new().with_failure("p2", "t2", "tracker offline"));
    let switchboard = switchboard(invoker.clone(), Arc::new(ManualClock::default()));

    let report = switchboard
        .execute_workflow(
            "bug_fix",
            json!({"description": "crash on start", "context_needed": true}),
            None,
        )
        .await;

    assert!(!report.success);
    assert_eq!(report.executed_steps(), vec!["analyze", "create_issue"]);
    assert!(!report.outcome("create_issue").unwrap().result.success);
    assert_eq!(invoker.call_count("p4", "t4"), 0);
    assert_eq!(invoker.call_count("p2", "t2"), 1);
}

#[tokio::test]
async fn test_optional_context_failure_does_not_fail_workflow() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .with_response("p1", "t1", json!({"root_cause": "unchecked index"}))
            .with_response("p2", "t2", json!({"id": 1234}))
            .with_failure("p3", "t3", "repository not indexed"),
    );
    let switchboard = switchboard(invoker.clone(), Arc::new(ManualClock::default()));

    let report = switchboard
        .execute_workflow(
            "bug_fix",
            json!({"description": "crash on start", "context_needed": true}),
            None,
        )
        .await;

    assert!(report.success);
    assert_eq!(
        report.executed_steps(),
        vec!["analyze", "create_issue", "get_context", "generate_fix", "complete"]
    );
    assert_eq!(report.failed_steps, 1);
    assert_eq!(report.successful_steps, 4);
    assert!(!report.outcome("get_context").unwrap().result.success);

    let calls = invoker.calls();
    let fix = calls.iter().find(|call| call.tool == "t4").unwrap();
    assert_eq!(
        fix.payload["context"]["analyze"],
        json!({"root_cause": "unchecked index"})
    );
    let complete = calls.last().unwrap();
    assert_eq!(complete.target, "p2");
    assert_eq!(complete.payload["issue_id"], json!(1234));
}

#[tokio::test]
async fn test_unmet_condition_skips_step() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let switchboard = switchboard(invoker.clone(), Arc::new(ManualClock::default()));

    let report = switchboard
        .execute_workflow("bug_fix", json!({"description": "crash on start"}), None)
        .await;

    assert!(report.success);
    assert_eq!(report.steps_executed, 4);
    assert_eq!(report.skipped_steps, vec!["get_context"]);
    assert_eq!(invoker.call_count("p3", "t3"), 0);
}

#[tokio::test]
async fn test_identical_routes_within_ttl_call_once() {
    let invoker = Arc::new(ScriptedInvoker::new().with_response("p1", "ask", json!("cached answer")));
    let clock = Arc::new(ManualClock::default());
    let switchboard = switchboard(invoker.clone(), clock.clone());

    let first = switchboard
        .route_task(TaskContext::new("research", "best caching strategies"), None)
        .await;
    clock.advance(Duration::from_secs(120));
    let second = switchboard
        .route_task(TaskContext::new("research", "best caching strategies"), None)
        .await;

    assert!(first.success && !first.cached);
    assert!(second.success && second.cached);
    assert_eq!(second.execution_time_ms, 0);
    assert_eq!(invoker.call_count("p1", "ask"), 1);

    clock.advance(Duration::from_secs(300));
    let third = switchboard
        .route_task(TaskContext::new("research", "best caching strategies"), None)
        .await;
    assert!(!third.cached);
    assert_eq!(invoker.call_count("p1", "ask"), 2);
}

#[tokio::test]
async fn test_unknown_workflow_is_reported() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let switchboard = switchboard(invoker.clone(), Arc::new(ManualClock::default()));

    let report = switchboard.execute_workflow("deploy", json!({}), None).await;

    assert!(!report.success);
    assert!(report.workflow_id.is_none());
    assert_eq!(invoker.total_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_route_reports_failure() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let switchboard = switchboard(invoker.clone(), Arc::new(ManualClock::default()));
    let token = CancellationToken::new();
    token.cancel();

    let report = switchboard
        .route_task(TaskContext::new("research", "anything"), Some(token))
        .await;

    assert!(!report.success);
    assert!(!report.used_fallback);
    assert_eq!(report.error.as_deref(), Some("cancelled"));
    assert_eq!(invoker.total_calls(), 0);
}
