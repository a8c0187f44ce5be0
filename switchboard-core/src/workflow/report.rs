//! Workflow execution reports

use crate::context::CallResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step name
    pub step: String,

    /// Whether the step was optional
    #[serde(default)]
    pub optional: bool,

    #[serde(flatten)]
    pub result: CallResult,
}

/// Outcome of a workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    /// Run id (absent when the workflow was not found)
    pub workflow_id: Option<Uuid>,

    /// Workflow name as requested
    pub workflow: String,

    /// True when every executed mandatory step succeeded
    pub success: bool,

    pub steps_executed: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,

    /// Steps whose condition did not hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_steps: Vec<String>,

    /// Executed steps in order
    pub results: Vec<StepOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    pub total_duration_ms: u64,
}

impl WorkflowReport {
    /// Empty successful report for a starting run
    pub fn started(run_id: Uuid, workflow: impl Into<String>) -> Self {
        Self {
            workflow_id: Some(run_id),
            workflow: workflow.into(),
            success: true,
            steps_executed: 0,
            successful_steps: 0,
            failed_steps: 0,
            skipped_steps: Vec::new(),
            results: Vec::new(),
            error: None,
            started_at: Utc::now(),
            total_duration_ms: 0,
        }
    }

    /// Failure report for a workflow name that is not declared
    pub fn unknown(workflow: impl Into<String>) -> Self {
        let workflow = workflow.into();
        Self {
            workflow_id: None,
            success: false,
            error: Some(format!("Unknown workflow '{}'", workflow)),
            ..Self::started(Uuid::nil(), workflow)
        }
    }

    /// Append an executed step, updating the counters
    pub fn record(&mut self, outcome: StepOutcome) {
        self.steps_executed += 1;
        if outcome.result.success {
            self.successful_steps += 1;
        } else {
            self.failed_steps += 1;
        }
        self.results.push(outcome);
    }

    /// Mark the run failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.error = Some(error.into());
    }

    /// Outcome of a named step, if it executed
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.results.iter().find(|outcome| outcome.step == step)
    }

    /// Names of the executed steps in order
    pub fn executed_steps(&self) -> Vec<&str> {
        self.results.iter().map(|outcome| outcome.step.as_str()).collect()
    }
}
