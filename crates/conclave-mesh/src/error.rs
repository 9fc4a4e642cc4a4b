//! Error types for bus operations

use conclave_core::SeqNo;
use thiserror::Error;

/// Result type for bus operations
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors that can occur during bus operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// The bus was closed when the session terminated
    #[error("Bus is closed")]
    Closed,

    /// Cursor points past the end of the log
    #[error("Invalid cursor {requested}: log ends at {last}")]
    InvalidCursor { requested: SeqNo, last: SeqNo },

    /// A subscriber fell behind and missed messages
    #[error("Subscriber lagged: {skipped} messages skipped")]
    Lagged { skipped: u64 },

    /// Internal lock was poisoned
    #[error("Bus lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

impl MeshError {
    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            MeshError::Closed => "BUS_CLOSED",
            MeshError::InvalidCursor { .. } => "INVALID_CURSOR",
            MeshError::Lagged { .. } => "SUBSCRIBER_LAGGED",
            MeshError::LockPoisoned(_) => "LOCK_POISONED",
        }
    }
}
