//! Capability registry
//!
//! Providers are remote capability sources (typically MCP servers), each
//! exposing named tools. The registry is loaded once from configuration and is
//! read-only afterwards, so it is shared behind an `Arc` without locking.

mod provider;
mod registry;

pub use provider::{CapabilityProvider, InvocationEndpoint, ToolDescriptor};
pub use registry::{CapabilityRegistry, ProviderSummary, ToolSummary};
