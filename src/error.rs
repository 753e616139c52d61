//! Error types for the handoff runner

use std::time::Duration;

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AgentsError>;

/// Main error type
///
/// Errors local to one turn (enablement, handoff input, observer, tool) are
/// contained by the runner; only configuration errors and run-level limits
/// escape a run.
#[derive(Debug, Error)]
pub enum AgentsError {
    /// Error from the OpenAI client or its request builders
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    /// A run context field needed by a policy is absent
    #[error("Missing context field: {field}")]
    MissingContextField { field: String },

    /// The run context does not have the expected shape
    #[error("Invalid run context: {message}")]
    InvalidContext { message: String },

    /// The model produced a handoff payload that does not match the schema
    #[error("Invalid input for handoff '{tool_name}': {message}")]
    InvalidHandoffInput { tool_name: String, message: String },

    /// The model selected a handoff that was not offered this turn
    #[error("Handoff '{tool_name}' is not enabled")]
    HandoffNotEnabled { tool_name: String },

    /// A handoff observer failed
    #[error("Handoff observer error: {message}")]
    ObserverError { message: String },

    /// Tool execution error
    #[error("Tool execution error: {message}")]
    ToolExecutionError { message: String },

    /// The model provider failed or returned something unusable
    #[error("Provider error: {message}")]
    ProviderError { message: String },

    /// Maximum turns exceeded
    #[error("Maximum turns exceeded: {max_turns}")]
    MaxTurnsExceeded { max_turns: usize },

    /// The run did not finish within its deadline
    #[error("Run timed out after {elapsed:?}")]
    RunTimedOut { elapsed: Duration },

    /// Malformed agent definition or process configuration
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl AgentsError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Whether this error should abort the process rather than a single turn.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigError { .. } | Self::ConfigParseError(_) | Self::IoError(_)
        )
    }
}
