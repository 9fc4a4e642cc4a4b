//! Agent decision errors.

use thiserror::Error;

/// Errors an agent's decision step may return.
///
/// The distinction matters to the runtime: transient failures are retried
/// with backoff inside the same turn, fatal ones deactivate the agent for
/// the rest of the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    /// A failure expected to go away on retry (rate limit, flaky backend).
    #[error("transient decision failure: {reason}")]
    Transient { reason: String },

    /// A failure the agent cannot recover from.
    #[error("fatal decision failure: {reason}")]
    Fatal { reason: String },
}

impl DecisionError {
    pub fn transient(reason: impl Into<String>) -> Self {
        DecisionError::Transient {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        DecisionError::Fatal {
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DecisionError::Transient { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            DecisionError::Transient { reason } | DecisionError::Fatal { reason } => reason,
        }
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            DecisionError::Transient { .. } => "TRANSIENT_DECISION_ERROR",
            DecisionError::Fatal { .. } => "FATAL_DECISION_ERROR",
        }
    }
}

/// Result type alias for decision steps.
pub type DecisionResult<T> = Result<T, DecisionError>;
