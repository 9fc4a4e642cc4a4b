//! Error types for session construction and configuration.
//!
//! Nothing an agent or tool does at run time surfaces here: those failures
//! become transcript records. `SessionError` covers misconfiguration caught
//! when the session is built, plus infrastructure failures (a poisoned
//! store lock) that make continuing impossible.

use conclave_core::{AgentId, StateError, ToolName};
use conclave_mesh::MeshError;
use conclave_tools::ToolError;
use thiserror::Error;

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to parse {format} configuration: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when building or running a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session needs at least one agent.
    #[error("Session roster is empty")]
    EmptyRoster,

    /// Two roster entries share an id.
    #[error("Duplicate agent id in roster: {0}")]
    DuplicateAgent(AgentId),

    /// An agent was granted a tool the registry does not provide.
    #[error("Agent '{agent}' is granted unknown tool '{tool}'")]
    UnknownTool { agent: AgentId, tool: ToolName },

    #[error("Invalid session configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid initial state: {0}")]
    InvalidInitialState(String),

    #[error("Tool registration failed: {0}")]
    Tool(#[from] ToolError),

    #[error("State store failure: {0}")]
    State(#[from] StateError),

    #[error("Message bus failure: {0}")]
    Mesh(#[from] MeshError),

    #[error("Transcript serialization failed: {0}")]
    Serialization(String),
}

impl SessionError {
    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::EmptyRoster => "EMPTY_ROSTER",
            SessionError::DuplicateAgent(_) => "DUPLICATE_AGENT",
            SessionError::UnknownTool { .. } => "UNKNOWN_TOOL",
            SessionError::Config(_) => "CONFIG_ERROR",
            SessionError::InvalidInitialState(_) => "INVALID_INITIAL_STATE",
            SessionError::Tool(_) => "TOOL_ERROR",
            SessionError::State(_) => "STATE_ERROR",
            SessionError::Mesh(_) => "MESH_ERROR",
            SessionError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err.to_string())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::DuplicateAgent(AgentId::parse("writer").unwrap());
        assert_eq!(err.to_string(), "Duplicate agent id in roster: writer");
        assert_eq!(err.error_code(), "DUPLICATE_AGENT");
    }

    #[test]
    fn test_config_error_converts() {
        let err: SessionError = ConfigError::ValidationError("max_steps must be > 0".into()).into();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("max_steps"));
    }
}
