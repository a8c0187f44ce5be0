//! Invoker that talks MCP to a provider process over stdio
//!
//! Each call launches the provider's configured command, performs the
//! `initialize` handshake, sends one `tools/call` and reads the matching
//! response. The child is killed when the call finishes or its future is
//! dropped (for example by a timeout in the call executor).

use super::{InvokeError, Invoker};
use crate::capability::{CapabilityProvider, InvocationEndpoint};
use crate::mcp::{
    InitializeParams, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION, PeerInfo,
    ToolCallParams, ToolCallResult,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout, Command};

const INITIALIZE_ID: i64 = 1;
const CALL_ID: i64 = 2;

/// Stdio MCP client, one process per call
#[derive(Debug, Clone, Default)]
pub struct StdioMcpInvoker {
    endpoints: BTreeMap<String, InvocationEndpoint>,
}

impl StdioMcpInvoker {
    /// Create an invoker with no endpoints
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the launch commands of the given providers by endpoint target
    pub fn from_providers<'a>(providers: impl IntoIterator<Item = &'a CapabilityProvider>) -> Self {
        let endpoints = providers
            .into_iter()
            .filter(|provider| provider.endpoint.command.is_some())
            .map(|provider| (provider.endpoint.target.clone(), provider.endpoint.clone()))
            .collect();
        Self { endpoints }
    }

    /// Register an endpoint
    pub fn with_endpoint(mut self, endpoint: InvocationEndpoint) -> Self {
        self.endpoints.insert(endpoint.target.clone(), endpoint);
        self
    }

    /// Targets with a launch command
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

#[async_trait]
impl Invoker for StdioMcpInvoker {
    async fn invoke(&self, target: &str, tool: &str, payload: Value) -> Result<Value, InvokeError> {
        let endpoint = self
            .endpoints
            .get(target)
            .ok_or_else(|| InvokeError::UnknownEndpoint(target.to_string()))?;
        let command = endpoint.command.as_deref().ok_or_else(|| {
            InvokeError::Transport(format!("no launch command configured for '{}'", target))
        })?;

        let mut child = Command::new(command)
            .args(&endpoint.args)
            .envs(&endpoint.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InvokeError::Transport(format!("failed to launch '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| InvokeError::Transport("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InvokeError::Transport("child stdout unavailable".to_string()))?;

        let mut session = Session {
            stdin,
            lines: BufReader::new(stdout).lines(),
        };

        tracing::debug!(endpoint = %target, tool = %tool, command = %command, "stdio MCP call");

        let initialize = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: Value::Object(Default::default()),
            client_info: Some(PeerInfo {
                name: "switchboard".to_string(),
                version: crate::VERSION.to_string(),
            }),
        };
        session
            .request(JsonRpcRequest::new(INITIALIZE_ID, "initialize").with_params(to_value(&initialize)?))
            .await?;
        session
            .send(&JsonRpcRequest::notification("notifications/initialized"))
            .await?;

        let call = ToolCallParams {
            name: tool.to_string(),
            arguments: payload,
        };
        let response = session
            .request(JsonRpcRequest::new(CALL_ID, "tools/call").with_params(to_value(&call)?))
            .await?;

        if let Some(error) = response.error {
            return Err(InvokeError::rejected(target, tool, error.message));
        }
        let result: ToolCallResult = serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| InvokeError::Protocol(format!("invalid tools/call result: {}", e)))?;

        drop(session);
        let _ = child.kill().await;

        decode_tool_result(target, tool, result)
    }
}

struct Session {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl Session {
    async fn send(&mut self, message: &JsonRpcRequest) -> Result<(), InvokeError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| InvokeError::Protocol(e.to_string()))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| InvokeError::Transport(format!("write failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| InvokeError::Transport(format!("flush failed: {}", e)))
    }

    /// Send a request and wait for the response carrying the same id.
    ///
    /// Server notifications and unrelated messages are skipped.
    async fn request(&mut self, request: JsonRpcRequest) -> Result<JsonRpcResponse, InvokeError> {
        self.send(&request).await?;
        let expected = request.id.clone();

        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| InvokeError::Transport(format!("read failed: {}", e)))?
                .ok_or_else(|| {
                    InvokeError::Transport(format!(
                        "provider closed stdout before answering '{}'",
                        request.method
                    ))
                })?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(trimmed) {
                Ok(message) => message,
                Err(_) => {
                    tracing::trace!(line = %trimmed, "skipping non-JSON provider output");
                    continue;
                }
            };
            let is_response = message.get("result").is_some() || message.get("error").is_some();
            if !is_response {
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(message)
                .map_err(|e| InvokeError::Protocol(format!("malformed response: {}", e)))?;
            if Some(&response.id) == expected.as_ref() {
                return Ok(response);
            }
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, InvokeError> {
    serde_json::to_value(value).map_err(|e| InvokeError::Protocol(e.to_string()))
}

/// Turn an MCP tool result into plain JSON.
///
/// Structured content wins; otherwise the text blocks are parsed as JSON when
/// possible and returned as a string when not.
fn decode_tool_result(target: &str, tool: &str, result: ToolCallResult) -> Result<Value, InvokeError> {
    let text = result.text();
    if result.is_error == Some(true) {
        return Err(InvokeError::rejected(target, tool, text));
    }
    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}
