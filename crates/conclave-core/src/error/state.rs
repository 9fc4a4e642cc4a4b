//! State store and commit errors.

use std::sync::PoisonError;
use thiserror::Error;

use crate::state::Version;

/// Errors that can occur while reading or committing session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The writer's base version is stale: another commit landed first.
    #[error("version conflict: commit based on {base} but store is at {current}")]
    VersionConflict { base: Version, current: Version },

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("state lock poisoned during {operation}: {details}")]
    LockPoisoned {
        operation: &'static str,
        details: String,
    },

    /// A key failed validation while importing state.
    #[error("invalid state key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// State could not be encoded or decoded.
    #[error("state serialization failed: {details}")]
    Serialization { details: String },
}

impl StateError {
    pub fn lock_poisoned<T>(operation: &'static str, err: PoisonError<T>) -> Self {
        StateError::LockPoisoned {
            operation,
            details: err.to_string(),
        }
    }

    /// Conflicts are the only state errors worth retrying with a fresh snapshot.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::VersionConflict { .. })
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            StateError::VersionConflict { .. } => "VERSION_CONFLICT",
            StateError::LockPoisoned { .. } => "LOCK_POISONED",
            StateError::InvalidKey { .. } => "INVALID_STATE_KEY",
            StateError::Serialization { .. } => "STATE_SERIALIZATION",
        }
    }
}

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;
