//! # Switchboard - Task Routing and Workflow Orchestration over MCP
//!
//! Switchboard sits between a client and a set of remote capability providers
//! (MCP servers) and decides which provider tool handles a request:
//! - Ad-hoc tasks are routed by ordered, declarative routing rules
//! - Named workflows run multi-step plans with conditional and optional steps
//! - Every remote call is cached, timed, and given one fallback attempt
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SwitchboardConfig::from_file("switchboard.toml")?;
//!     let switchboard = Switchboard::builder(config).build();
//!
//!     let report = switchboard
//!         .route_task(TaskContext::new("research", "best caching strategies"), None)
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!
//!     McpServer::new(Arc::new(switchboard))
//!         .run(StdioTransport::new())
//!         .await
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Capability registry**: read-only provider and tool lookup
//! - **Result cache**: TTL memoization keyed by provider, tool and canonical payload
//! - **Call executor**: the single path to providers (cache, fallback, deadlines)
//! - **Rule matcher / sequence executor**: first-match routing and ordered call chains
//! - **Workflow engine**: declared multi-step workflows
//! - **Invoker**: the pluggable channel that actually reaches a provider

pub mod cache;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod invoker;
pub mod mcp;
pub mod payload;
pub mod routing;
pub mod switchboard;
pub mod workflow;

pub use switchboard::Switchboard;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheConfig, Clock, ManualClock, ResultCache, SystemClock};
    pub use crate::capability::{
        CapabilityProvider, CapabilityRegistry, InvocationEndpoint, ProviderSummary,
        ToolDescriptor,
    };
    pub use crate::config::{FallbackStrategy, IntegrationSettings, SwitchboardConfig};
    pub use crate::context::{CallResult, TaskContext};
    pub use crate::error::{Result, SwitchboardError};
    pub use crate::executor::{CallContext, CallExecutor};
    pub use crate::invoker::{InvokeError, Invoker, ScriptedInvoker, StdioMcpInvoker};
    pub use crate::mcp::{McpServer, StdioTransport, Transport};
    pub use crate::routing::{
        FallbackCall, RoutingRule, RuleAction, RuleCondition, RuleMatcher, SequenceStep,
        SingleCall,
    };
    pub use crate::switchboard::{RouteReport, RouteTarget, RoutedTo, Switchboard, SwitchboardBuilder};
    pub use crate::workflow::{
        StepCondition, WorkflowDefinition, WorkflowEngine, WorkflowReport, WorkflowStep,
        WorkflowSummary,
    };
    pub use tokio_util::sync::CancellationToken;
}
