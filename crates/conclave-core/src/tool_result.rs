//! Tool invocation results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::identifiers::{CorrelationId, ToolName};

/// Why a tool invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    /// The caller lacks the capability to invoke the tool.
    Unauthorized,
    /// Arguments did not match the tool's schema.
    SchemaValidation,
    /// The handler ran and failed.
    Execution,
    /// No tool is registered under the name.
    NotFound,
    /// The handler did not finish within the registry timeout.
    Timeout,
    /// The session was cancelled while the tool was running.
    Cancelled,
}

impl fmt::Display for ToolFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolFailureKind::Unauthorized => "unauthorized",
            ToolFailureKind::SchemaValidation => "schema_validation",
            ToolFailureKind::Execution => "execution",
            ToolFailureKind::NotFound => "not_found",
            ToolFailureKind::Timeout => "timeout",
            ToolFailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolFailureKind,
    pub reason: String,
}

impl ToolFailure {
    pub fn new(kind: ToolFailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { value: Value },
    Failure(ToolFailure),
}

/// Result of one tool invocation, linked to the `Invoke` that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: ToolName,
    pub correlation_id: CorrelationId,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(tool: ToolName, correlation_id: CorrelationId, value: Value) -> Self {
        Self {
            tool,
            correlation_id,
            outcome: ToolOutcome::Success { value },
        }
    }

    pub fn failure(tool: ToolName, correlation_id: CorrelationId, failure: ToolFailure) -> Self {
        Self {
            tool,
            correlation_id,
            outcome: ToolOutcome::Failure(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Success { value } => Some(value),
            ToolOutcome::Failure(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<ToolFailureKind> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure(failure) => Some(failure.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_serializes_inline() {
        let result = ToolResult::failure(
            ToolName::parse("state_write").unwrap(),
            CorrelationId::new(),
            ToolFailure::new(ToolFailureKind::Unauthorized, "not in capabilities"),
        );
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(
            encoded["outcome"],
            json!({"status": "failure", "kind": "unauthorized", "reason": "not in capabilities"})
        );
        assert_eq!(result.failure_kind(), Some(ToolFailureKind::Unauthorized));
        assert!(result.value().is_none());
    }

    #[test]
    fn success_exposes_value() {
        let result = ToolResult::success(
            ToolName::parse("echo").unwrap(),
            CorrelationId::new(),
            json!({"text": "hi"}),
        );
        assert!(result.is_success());
        assert_eq!(result.value(), Some(&json!({"text": "hi"})));
    }
}
