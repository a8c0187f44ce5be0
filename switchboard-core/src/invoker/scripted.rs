//! Invoker with predetermined responses

use super::{InvokeError, Invoker};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

type Response = Result<Value, String>;

/// One call seen by a [`ScriptedInvoker`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub target: String,
    pub tool: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
struct Script {
    /// One-shot responses, consumed before the sticky one
    queued: VecDeque<Response>,
    /// Response repeated once the queue is empty
    sticky: Option<Response>,
    delay: Option<Duration>,
}

/// Deterministic invoker.
///
/// Responses are scripted per `(target, tool)`. Queued responses are returned
/// in order, then the sticky response repeats. Unscripted calls echo their
/// input back as `{"target", "tool", "payload"}`.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<(String, String), Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedInvoker {
    /// Create an invoker that echoes every call
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `target/tool` with `value`
    pub fn with_response(self, target: &str, tool: &str, value: Value) -> Self {
        self.script(target, tool, |script| script.sticky = Some(Ok(value)));
        self
    }

    /// Always fail `target/tool` with `message`
    pub fn with_failure(self, target: &str, tool: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        self.script(target, tool, |script| script.sticky = Some(Err(message)));
        self
    }

    /// Wait before answering `target/tool`
    pub fn with_delay(self, target: &str, tool: &str, delay: Duration) -> Self {
        self.script(target, tool, |script| script.delay = Some(delay));
        self
    }

    /// Queue a one-shot successful response
    pub fn push_response(&self, target: &str, tool: &str, value: Value) {
        self.script(target, tool, |script| script.queued.push_back(Ok(value)));
    }

    /// Queue a one-shot failure
    pub fn push_failure(&self, target: &str, tool: &str, message: impl Into<String>) {
        let message = message.into();
        self.script(target, tool, |script| script.queued.push_back(Err(message)));
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of calls received for `target/tool`
    pub fn call_count(&self, target: &str, tool: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.target == target && call.tool == tool)
            .count()
    }

    /// Total number of calls received
    pub fn total_calls(&self) -> usize {
        self.calls().len()
    }

    fn script(&self, target: &str, tool: &str, edit: impl FnOnce(&mut Script)) {
        let mut scripts = self
            .scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        edit(
            scripts
                .entry((target.to_string(), tool.to_string()))
                .or_default(),
        );
    }

    fn next_response(&self, target: &str, tool: &str) -> (Option<Response>, Option<Duration>) {
        let mut scripts = self
            .scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match scripts.get_mut(&(target.to_string(), tool.to_string())) {
            Some(script) => {
                let response = script.queued.pop_front().or_else(|| script.sticky.clone());
                (response, script.delay)
            }
            None => (None, None),
        }
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    async fn invoke(&self, target: &str, tool: &str, payload: Value) -> Result<Value, InvokeError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                target: target.to_string(),
                tool: tool.to_string(),
                payload: payload.clone(),
            });

        let (response, delay) = self.next_response(target, tool);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(InvokeError::rejected(target, tool, message)),
            None => Ok(json!({ "target": target, "tool": tool, "payload": payload })),
        }
    }
}
