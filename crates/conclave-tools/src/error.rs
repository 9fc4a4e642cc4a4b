//! Tool registration and invocation errors.

use conclave_core::{ToolFailure, ToolFailureKind, ToolName};
use thiserror::Error;

use crate::schema::SchemaViolation;

/// Errors raised by the tool registry.
///
/// Invocation errors never escape a session: the registry turns them into
/// failed [`ToolResult`](conclave_core::ToolResult)s via [`ToolError::to_failure`].
/// Registration errors surface at session construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// The caller's capability set does not include the tool.
    #[error("agent is not allowed to invoke tool '{tool}'")]
    Unauthorized { tool: ToolName },

    /// Arguments did not match the tool's declared schema.
    #[error("arguments for tool '{tool}' failed validation: {}", join_violations(.violations))]
    SchemaValidation {
        tool: ToolName,
        violations: Vec<SchemaViolation>,
    },

    /// The handler returned an error.
    #[error("tool '{tool}' failed: {message}")]
    Execution { tool: ToolName, message: String },

    /// No tool is registered under the name.
    #[error("tool '{tool}' is not registered")]
    NotFound { tool: ToolName },

    /// The handler exceeded the registry timeout.
    #[error("tool '{tool}' timed out after {duration_ms}ms")]
    Timeout { tool: ToolName, duration_ms: u64 },

    /// A tool with the same name is already registered.
    #[error("tool '{tool}' is already registered")]
    AlreadyRegistered { tool: ToolName },

    /// A tool name failed validation.
    #[error("invalid tool name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The registry lock was poisoned.
    #[error("tool registry lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ToolError {
    /// Failure kind reported in a `ToolResult`.
    pub fn failure_kind(&self) -> ToolFailureKind {
        match self {
            ToolError::Unauthorized { .. } => ToolFailureKind::Unauthorized,
            ToolError::SchemaValidation { .. } => ToolFailureKind::SchemaValidation,
            ToolError::NotFound { .. } => ToolFailureKind::NotFound,
            ToolError::Timeout { .. } => ToolFailureKind::Timeout,
            ToolError::Execution { .. }
            | ToolError::AlreadyRegistered { .. }
            | ToolError::InvalidName { .. }
            | ToolError::LockPoisoned(_) => ToolFailureKind::Execution,
        }
    }

    pub fn to_failure(&self) -> ToolFailure {
        ToolFailure::new(self.failure_kind(), self.to_string())
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            ToolError::Unauthorized { .. } => "TOOL_UNAUTHORIZED",
            ToolError::SchemaValidation { .. } => "TOOL_SCHEMA_VALIDATION",
            ToolError::Execution { .. } => "TOOL_EXECUTION",
            ToolError::NotFound { .. } => "TOOL_NOT_FOUND",
            ToolError::Timeout { .. } => "TOOL_TIMEOUT",
            ToolError::AlreadyRegistered { .. } => "TOOL_ALREADY_REGISTERED",
            ToolError::InvalidName { .. } => "TOOL_INVALID_NAME",
            ToolError::LockPoisoned(_) => "LOCK_POISONED",
        }
    }
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, ToolError>;
