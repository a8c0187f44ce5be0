//! Sequence action execution
//!
//! Runs the steps of a sequence action in order through the call executor.
//! The first failing step ends the sequence and its result is returned as the
//! overall outcome; otherwise the outputs are returned as an ordered array.

use super::rule::SequenceStep;
use crate::context::CallResult;
use crate::executor::{CallContext, CallExecutor};
use crate::payload::merge_shallow;
use serde_json::{Map, Value};
use std::time::Instant;

/// Field the previous step's data is injected under
pub const PREVIOUS_RESULT_FIELD: &str = "previous_result";

/// Provider label on the result of a completed sequence
pub const SEQUENCE_PROVIDER: &str = "sequence";

/// Executes sequence actions
#[derive(Debug, Clone, Copy)]
pub struct SequenceExecutor<'a> {
    executor: &'a CallExecutor,
}

impl<'a> SequenceExecutor<'a> {
    pub fn new(executor: &'a CallExecutor) -> Self {
        Self { executor }
    }

    /// Run `steps` starting from `payload`.
    ///
    /// Each step's request is the cumulative base payload with the step's
    /// params merged over it. Steps never use a fallback.
    pub async fn run(
        &self,
        steps: &[SequenceStep],
        payload: Map<String, Value>,
        ctx: &CallContext,
    ) -> CallResult {
        let started = Instant::now();
        let mut base = payload;
        let mut outputs = Vec::with_capacity(steps.len());
        let mut previous: Option<Value> = None;

        for (index, step) in steps.iter().enumerate() {
            let mut request = base.clone();
            merge_shallow(&mut request, &step.params);
            if step.use_previous_result && index > 0 {
                if let Some(prev) = &previous {
                    request.insert(PREVIOUS_RESULT_FIELD.to_string(), prev.clone());
                }
            }

            let result = self
                .executor
                .invoke(&step.provider, &step.tool, Value::Object(request), ctx, None)
                .await;

            if !result.success {
                tracing::warn!(
                    correlation_id = %ctx.correlation_id,
                    step = index,
                    provider = %step.provider,
                    tool = %step.tool,
                    "sequence step failed, aborting"
                );
                return result;
            }

            let data = result.data.unwrap_or(Value::Null);
            if step.pass_result_to_next {
                if let Value::Object(fields) = &data {
                    merge_shallow(&mut base, fields);
                }
            }
            previous = Some(data.clone());
            outputs.push(data);
        }

        CallResult::success(
            SEQUENCE_PROVIDER,
            sequence_label(steps),
            Value::Array(outputs),
            started.elapsed(),
        )
    }
}

/// `p1.t1 -> p2.t2`
pub fn sequence_label(steps: &[SequenceStep]) -> String {
    steps
        .iter()
        .map(|step| format!("{}.{}", step.provider, step.tool))
        .collect::<Vec<_>>()
        .join(" -> ")
}
