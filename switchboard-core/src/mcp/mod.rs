//! Model Context Protocol (MCP) support
//!
//! MCP is JSON-RPC 2.0 over newline-delimited stdio. Switchboard speaks it in
//! both directions:
//! - [`McpServer`] exposes the routing and workflow entry points as tools
//! - [`StdioMcpInvoker`](crate::invoker::StdioMcpInvoker) calls tools on
//!   provider servers
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchboard_core::mcp::{McpServer, StdioTransport};
//! use switchboard_core::Switchboard;
//!
//! let switchboard = Arc::new(Switchboard::from_env()?);
//! McpServer::new(switchboard).run(StdioTransport::new()).await?;
//! ```
//!
//! Supported methods: `initialize`, `ping`, `tools/list`, `tools/call`.
//! Notifications are accepted and never answered.

mod protocol;
mod server;
pub mod tools;
mod transport;

pub use protocol::*;
pub use server::{McpServer, McpServerConfig};
pub use transport::{MemoryTransport, StdioTransport, Transport};
