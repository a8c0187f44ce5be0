//! Error types for Switchboard operations
//!
//! Only configuration and transport problems surface as `Err`. Remote call
//! failures, routing misses and unknown workflows are reported as data
//! (`CallResult`, `RouteReport`, `WorkflowReport`).

/// Result type for Switchboard operations
pub type Result<T> = std::result::Result<T, SwitchboardError>;

/// Error types for the Switchboard engine
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    /// Configuration could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Rules or workflows name providers, tools or steps that do not exist
    #[error("Invalid references in configuration: {}", .0.join("; "))]
    InvalidReferences(Vec<String>),

    /// Transport (stdio, process) failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<figment::Error> for SwitchboardError {
    fn from(err: figment::Error) -> Self {
        SwitchboardError::Configuration(format!("Failed to load configuration: {}", err))
    }
}
