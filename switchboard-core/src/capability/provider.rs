//! Provider and tool descriptors

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Description of one tool exposed by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Human readable description
    #[serde(default)]
    pub description: String,

    /// Situations the tool is a good fit for
    #[serde(default, alias = "best_for")]
    pub use_cases: Vec<String>,

    /// Parameter name to hint (type or short explanation)
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ToolDescriptor {
    /// Create a descriptor with a description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// Add a use-case hint
    pub fn with_use_case(mut self, hint: impl Into<String>) -> Self {
        self.use_cases.push(hint.into());
        self
    }

    /// Add a parameter hint
    pub fn with_parameter(mut self, name: impl Into<String>, hint: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), hint.into());
        self
    }
}

/// Where a provider is reached.
///
/// `target` is opaque to the engine and is handed verbatim to the
/// [`Invoker`](crate::invoker::Invoker). The launch fields are only read by
/// [`StdioMcpInvoker`](crate::invoker::StdioMcpInvoker).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationEndpoint {
    /// Identifier resolved by the invocation channel (defaults to the provider id)
    #[serde(default)]
    pub target: String,

    /// Command that starts a stdio MCP server for this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for `command`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment for `command`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl InvocationEndpoint {
    /// Endpoint with only a target identifier
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Endpoint launched as a local process
    pub fn command(
        target: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            target: target.into(),
            command: Some(command.into()),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }
}

/// A registered remote capability source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProvider {
    /// Provider id (the key it is registered under)
    #[serde(default)]
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// What the provider is for
    #[serde(default)]
    pub description: String,

    /// Capability tags used for filtering
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Tools by name
    #[serde(default)]
    pub tools: BTreeMap<String, ToolDescriptor>,

    /// Invocation endpoint
    #[serde(default)]
    pub endpoint: InvocationEndpoint,
}

impl CapabilityProvider {
    /// Create a provider whose endpoint target is its id
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            endpoint: InvocationEndpoint::target(&id),
            id,
            name: name.into(),
            description: String::new(),
            capabilities: BTreeSet::new(),
            tools: BTreeMap::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a capability tag
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.insert(tag.into());
        self
    }

    /// Add a tool
    pub fn with_tool(mut self, name: impl Into<String>, tool: ToolDescriptor) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    /// Replace the endpoint
    pub fn with_endpoint(mut self, endpoint: InvocationEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Whether the provider carries a capability tag
    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    /// Whether the provider declares a tool.
    ///
    /// Providers that enumerate no tools accept any tool name.
    pub fn accepts_tool(&self, tool: &str) -> bool {
        self.tools.is_empty() || self.tools.contains_key(tool)
    }

    /// Fill in defaults that depend on the registration key
    pub(crate) fn normalize(&mut self, key: &str) {
        if self.id.is_empty() {
            self.id = key.to_string();
        }
        if self.name.is_empty() {
            self.name = self.id.clone();
        }
        if self.endpoint.target.is_empty() {
            self.endpoint.target = self.id.clone();
        }
    }
}
