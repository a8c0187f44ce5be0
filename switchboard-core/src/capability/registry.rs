//! Read-only registry of capability providers
//!
//! The `CapabilityRegistry` provides:
//! - Lookup by provider id
//! - Filtering by capability tag
//! - Endpoint resolution for the call executor
//! - Summaries for the `list_available_mcps` introspection tool
//!
//! # Example
//!
//! ```rust,ignore
//! use switchboard_core::capability::{CapabilityProvider, CapabilityRegistry};
//!
//! let registry = CapabilityRegistry::from_providers([
//!     CapabilityProvider::new("perplexity", "Perplexity").with_capability("search"),
//! ]);
//!
//! let search = registry.filter_by_capability("search");
//! assert_eq!(search.len(), 1);
//! ```

use super::provider::CapabilityProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of one tool for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Use-case hints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub use_cases: Vec<String>,
}

/// Summary of a provider for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    /// Provider id
    pub id: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Capability tags
    pub capabilities: Vec<String>,
    /// Exposed tools
    pub tools: Vec<ToolSummary>,
}

impl From<&CapabilityProvider> for ProviderSummary {
    fn from(provider: &CapabilityProvider) -> Self {
        Self {
            id: provider.id.clone(),
            name: provider.name.clone(),
            description: provider.description.clone(),
            capabilities: provider.capabilities.iter().cloned().collect(),
            tools: provider
                .tools
                .iter()
                .map(|(name, tool)| ToolSummary {
                    name: name.clone(),
                    description: tool.description.clone(),
                    use_cases: tool.use_cases.clone(),
                })
                .collect(),
        }
    }
}

/// Registry of capability providers, built once and never mutated
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    providers: BTreeMap<String, CapabilityProvider>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from providers keyed by their id
    pub fn from_providers(providers: impl IntoIterator<Item = CapabilityProvider>) -> Self {
        let providers = providers
            .into_iter()
            .map(|mut provider| {
                let key = provider.id.clone();
                provider.normalize(&key);
                (key, provider)
            })
            .collect();
        Self { providers }
    }

    /// Build from a map keyed by provider id (the configuration shape)
    pub fn from_map(providers: BTreeMap<String, CapabilityProvider>) -> Self {
        let providers = providers
            .into_iter()
            .map(|(key, mut provider)| {
                provider.normalize(&key);
                (key, provider)
            })
            .collect();
        Self { providers }
    }

    /// All providers by id
    pub fn providers(&self) -> &BTreeMap<String, CapabilityProvider> {
        &self.providers
    }

    /// Look up a provider
    pub fn get(&self, id: &str) -> Option<&CapabilityProvider> {
        self.providers.get(id)
    }

    /// Providers carrying a capability tag
    pub fn filter_by_capability(&self, tag: &str) -> Vec<&CapabilityProvider> {
        self.providers
            .values()
            .filter(|provider| provider.has_capability(tag))
            .collect()
    }

    /// Whether `provider` exists and accepts `tool`
    pub fn has_tool(&self, provider: &str, tool: &str) -> bool {
        self.get(provider)
            .is_some_and(|provider| provider.accepts_tool(tool))
    }

    /// Invocation target for a provider
    pub fn endpoint_target(&self, id: &str) -> Option<&str> {
        self.get(id).map(|provider| provider.endpoint.target.as_str())
    }

    /// Summaries, optionally restricted to one capability tag
    pub fn summaries(&self, capability: Option<&str>) -> Vec<ProviderSummary> {
        match capability {
            Some(tag) => self
                .filter_by_capability(tag)
                .into_iter()
                .map(ProviderSummary::from)
                .collect(),
            None => self.providers.values().map(ProviderSummary::from).collect(),
        }
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
