use conclave_agent::{ConfigError, SessionError};
use conclave_core::AgentId;
use conclave_tools::ToolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file format for '{0}' (expected .yaml, .yml, .toml or .json)")]
    UnsupportedFormat(String),

    #[error("Failed to parse {format} scenario: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Transcript has turns for agent '{0}', which the scenario does not declare")]
    UnknownAgent(AgentId),

    #[error("Replay diverged: recorded versions {expected:?}, replayed {actual:?}")]
    ReplayMismatch { expected: Vec<u64>, actual: Vec<u64> },
}

impl CliError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CliError::Read { .. } => "READ_FAILED",
            CliError::Write { .. } => "WRITE_FAILED",
            CliError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            CliError::Parse { .. } => "PARSE_FAILED",
            CliError::Config(_) => "INVALID_CONFIG",
            CliError::Session(error) => error.error_code(),
            CliError::Tool(error) => error.error_code(),
            CliError::UnknownAgent(_) => "UNKNOWN_AGENT",
            CliError::ReplayMismatch { .. } => "REPLAY_MISMATCH",
        }
    }
}
