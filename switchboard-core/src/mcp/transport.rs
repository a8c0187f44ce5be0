//! MCP Transport Implementations
//!
//! Transports handle the I/O for MCP communication.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::error::{Result, SwitchboardError};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send {
    /// Receive the next request; `None` when the peer has gone away
    async fn receive(&mut self) -> Result<Option<JsonRpcRequest>>;

    /// Send a response
    async fn send(&mut self, response: JsonRpcResponse) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &mut T {
    async fn receive(&mut self) -> Result<Option<JsonRpcRequest>> {
        (**self).receive().await
    }

    async fn send(&mut self, response: JsonRpcResponse) -> Result<()> {
        (**self).send(response).await
    }
}

/// Newline-delimited JSON over a reader/writer pair.
///
/// Lines that are not valid JSON-RPC requests are answered with a parse
/// error and skipped.
pub struct StdioTransport<R = Stdin, W = Stdout> {
    reader: BufReader<R>,
    writer: W,
}

impl StdioTransport {
    /// Transport over the process's stdin/stdout
    pub fn new() -> Self {
        Self::with_io(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Transport over arbitrary streams
    pub fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn write_line(&mut self, response: &JsonRpcResponse) -> Result<()> {
        let mut line = serde_json::to_string(response)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SwitchboardError::Transport(format!("Failed to write response: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| SwitchboardError::Transport(format!("Failed to flush output: {}", e)))
    }
}

#[async_trait]
impl<R, W> Transport for StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<JsonRpcRequest>> {
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| SwitchboardError::Transport(format!("Failed to read input: {}", e)))?;
            if read == 0 {
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str(trimmed) {
                Ok(request) => return Ok(Some(request)),
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable JSON-RPC message");
                    self.write_line(&JsonRpcResponse::error(
                        RequestId::Null,
                        JsonRpcError::parse_error(),
                    ))
                    .await?;
                }
            }
        }
    }

    async fn send(&mut self, response: JsonRpcResponse) -> Result<()> {
        self.write_line(&response).await
    }
}

/// In-memory transport for testing
#[derive(Debug, Default)]
pub struct MemoryTransport {
    requests: VecDeque<JsonRpcRequest>,
    responses: Vec<JsonRpcResponse>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request to be received
    pub fn push_request(&mut self, request: JsonRpcRequest) {
        self.requests.push_back(request);
    }

    /// All sent responses
    pub fn responses(&self) -> &[JsonRpcResponse] {
        &self.responses
    }

    /// Take the last response
    pub fn pop_response(&mut self) -> Option<JsonRpcResponse> {
        self.responses.pop()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive(&mut self) -> Result<Option<JsonRpcRequest>> {
        Ok(self.requests.pop_front())
    }

    async fn send(&mut self, response: JsonRpcResponse) -> Result<()> {
        self.responses.push(response);
        Ok(())
    }
}
