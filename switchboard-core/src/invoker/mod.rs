//! Capability invocation channel
//!
//! The engine reaches providers only through the [`Invoker`] trait: given an
//! endpoint target, a tool name and a JSON payload it returns the tool's JSON
//! result or an [`InvokeError`]. No retry or backoff happens inside an invoker;
//! the call executor owns caching, fallback and deadlines.
//!
//! Two implementations ship with the crate:
//! - [`StdioMcpInvoker`] launches the provider's configured command and speaks
//!   MCP (JSON-RPC 2.0) over its stdin/stdout.
//! - [`ScriptedInvoker`] returns predetermined responses and records every
//!   call, for tests and dry runs.

mod scripted;
mod stdio;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub use scripted::{RecordedCall, ScriptedInvoker};
pub use stdio::StdioMcpInvoker;

/// Failure reported by an invocation channel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    /// The provider answered with an error
    #[error("{target}/{tool} failed: {message}")]
    Rejected {
        target: String,
        tool: String,
        message: String,
    },

    /// No endpoint is known for the target
    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    /// The provider could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider's reply could not be understood
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl InvokeError {
    /// Provider-side rejection
    pub fn rejected(
        target: impl Into<String>,
        tool: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        InvokeError::Rejected {
            target: target.into(),
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Channel that performs one remote tool call
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke `tool` on the provider identified by `target`
    async fn invoke(&self, target: &str, tool: &str, payload: Value) -> Result<Value, InvokeError>;
}

#[async_trait]
impl<T: Invoker + ?Sized> Invoker for Arc<T> {
    async fn invoke(&self, target: &str, tool: &str, payload: Value) -> Result<Value, InvokeError> {
        (**self).invoke(target, tool, payload).await
    }
}
