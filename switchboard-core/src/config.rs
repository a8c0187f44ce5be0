//! Configuration for Switchboard
//!
//! One document declares providers, routing rules, workflows, advisory
//! fallback strategies and integration settings. It is loaded with `figment`
//! from a TOML, YAML or JSON file (chosen by extension) with
//! `SWITCHBOARD_`-prefixed environment variables merged on top, nested keys
//! separated by `__`:
//!
//! ```text
//! SWITCHBOARD_INTEGRATION_SETTINGS__CACHE_TTL_SECONDS=60
//! ```
//!
//! Any load failure is fatal. References between sections are checked after
//! parsing; see [`SwitchboardConfig::reference_issues`].

use crate::cache::CacheConfig;
use crate::capability::CapabilityProvider;
use crate::error::{Result, SwitchboardError};
use crate::routing::RoutingRule;
use crate::workflow::WorkflowDefinition;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "SWITCHBOARD_CONFIG";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "SWITCHBOARD_";

/// File used when [`CONFIG_ENV_VAR`] is unset
pub const DEFAULT_CONFIG_FILE: &str = "switchboard.toml";

/// Complete configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    /// Capability providers by id
    #[serde(default, alias = "mcps")]
    pub providers: BTreeMap<String, CapabilityProvider>,

    /// Routing rules in priority order
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>,

    /// Workflows by name
    #[serde(default)]
    pub workflows: BTreeMap<String, WorkflowDefinition>,

    /// Advisory retry/backoff metadata, kept verbatim
    #[serde(default)]
    pub fallback_strategies: BTreeMap<String, FallbackStrategy>,

    #[serde(default)]
    pub integration_settings: IntegrationSettings,
}

/// Advisory fallback metadata. The engine performs no retries of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackStrategy {
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default)]
    pub backoff_ms: u64,

    /// Providers that could stand in for this one
    #[serde(default, alias = "fallback_mcps")]
    pub alternate_providers: Vec<String>,
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationSettings {
    /// Global cache switch
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Cache freshness window
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Per-call deadline; 0 disables it
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// In-flight call cap across all requests; 0 means unbounded
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Also treat `get_context`, `get_library_docs` and `search_docs` as optional steps
    #[serde(default)]
    pub legacy_optional_steps: bool,

    /// Fail the load on dangling references instead of warning
    #[serde(default = "default_true")]
    pub validate_references: bool,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent_calls() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_seconds: default_cache_ttl_seconds(),
            default_timeout_ms: default_timeout_ms(),
            max_concurrent_calls: default_max_concurrent_calls(),
            log_level: default_log_level(),
            legacy_optional_steps: false,
            validate_references: true,
        }
    }
}

impl IntegrationSettings {
    /// Result cache settings
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache_enabled,
            ttl: Duration::from_secs(self.cache_ttl_seconds),
        }
    }

    /// Per-call deadline, if any
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }
}

impl SwitchboardConfig {
    /// Load from the file named by `SWITCHBOARD_CONFIG` (or `switchboard.toml`)
    /// merged with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or (with
    /// `validate_references`) contains dangling references.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(path)
    }

    /// Load from a specific file merged with environment overrides.
    ///
    /// The format follows the extension: `.toml`, `.yaml`/`.yml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unsupported extension,
    /// cannot be parsed, or fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SwitchboardError::Configuration(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let figment = match extension.as_str() {
            "toml" => Figment::new().merge(Toml::file(path)),
            "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
            "json" => Figment::new().merge(Json::file(path)),
            other => {
                return Err(SwitchboardError::Configuration(format!(
                    "unsupported configuration format '{}' for {}",
                    other,
                    path.display()
                )));
            }
        };

        tracing::debug!(path = %path.display(), "loading configuration");
        let overrides = Env::prefixed(ENV_PREFIX).ignore(&["CONFIG"]).split("__");
        Self::from_figment(figment.merge(overrides))
    }

    /// Parse a TOML document (no environment overrides)
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    /// Extract, normalize and validate
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: SwitchboardConfig = figment.extract()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Fill names and endpoint targets from their keys
    fn normalize(&mut self) {
        for (key, provider) in self.providers.iter_mut() {
            provider.normalize(key);
        }
        for (index, rule) in self.routing_rules.iter_mut().enumerate() {
            if rule.name.is_empty() {
                rule.name = format!("rule_{}", index + 1);
            }
        }
        for (key, workflow) in self.workflows.iter_mut() {
            if workflow.name.is_empty() {
                workflow.name = key.clone();
            }
        }
    }

    /// Check references between sections.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchboardError::InvalidReferences`] when issues exist and
    /// `validate_references` is set; otherwise issues are logged.
    pub fn validate(&self) -> Result<()> {
        for workflow in self.workflows.values() {
            for step in &workflow.steps {
                if let Some(condition) = step.condition.as_ref().filter(|c| !c.is_known()) {
                    tracing::warn!(
                        workflow = %workflow.name,
                        step = %step.name,
                        condition = %condition,
                        "unknown step condition, step will always run"
                    );
                }
            }
        }

        for (name, strategy) in &self.fallback_strategies {
            for alternate in &strategy.alternate_providers {
                if !self.providers.contains_key(alternate) {
                    tracing::warn!(
                        strategy = %name,
                        provider = %alternate,
                        "fallback strategy names unknown provider"
                    );
                }
            }
        }

        let issues = self.reference_issues();
        if issues.is_empty() {
            return Ok(());
        }
        if self.integration_settings.validate_references {
            return Err(SwitchboardError::InvalidReferences(issues));
        }
        for issue in &issues {
            tracing::warn!(issue = %issue, "configuration reference problem");
        }
        Ok(())
    }

    /// Dangling references: unknown providers or tools in rules and workflow
    /// steps, duplicate step names, and context/resource sources that are not
    /// earlier steps.
    pub fn reference_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for rule in &self.routing_rules {
            for (provider, tool) in rule.action.references() {
                if let Some(issue) = self.call_issue(&format!("rule '{}'", rule.name), provider, tool) {
                    issues.push(issue);
                }
            }
        }

        for workflow in self.workflows.values() {
            for step in &workflow.steps {
                let owner = format!("workflow '{}' step '{}'", workflow.name, step.name);
                if let Some(issue) = self.call_issue(&owner, &step.provider, &step.tool) {
                    issues.push(issue);
                }
            }
            issues.extend(workflow.structural_issues());
        }

        issues
    }

    fn call_issue(&self, owner: &str, provider: &str, tool: &str) -> Option<String> {
        match self.providers.get(provider) {
            None => Some(format!("{} names unknown provider '{}'", owner, provider)),
            Some(p) if !p.accepts_tool(tool) => Some(format!(
                "{} names unknown tool '{}' on provider '{}'",
                owner, tool, provider
            )),
            Some(_) => None,
        }
    }
}
