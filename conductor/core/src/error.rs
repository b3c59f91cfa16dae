//! Error Types
//!
//! Each layer has its own error enum. Whether an error is fatal depends on
//! the call site, not the type: the producer downgrades every
//! [`StoreError`] to a log line, while the caller-facing conductor surfaces
//! the ones that make a request meaningless (user message persistence,
//! stream registration, history reads).

use thiserror::Error;

/// Failure talking to the shared store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the command
    #[error("store unavailable during {operation}: {message}")]
    Unavailable {
        /// Logical operation that failed (e.g. `"set_with_ttl"`)
        operation: &'static str,
        /// Backend-specific detail
        message: String,
    },

    /// The store was configured with an unusable URL or option
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Build an `Unavailable` error from any displayable backend error
    pub fn unavailable(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            operation,
            message: err.to_string(),
        }
    }

    /// Whether this is a transient availability failure
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Failure raised by a response generator
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The generator could not produce the next unit
    #[error("generation failed: {0}")]
    Failed(String),
}

/// Errors surfaced to callers of the conductor
#[derive(Debug, Error)]
pub enum ConductorError {
    /// The shared store failed on a path that cannot degrade
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A message could not be encoded for the store
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The conductor is shutting down and no longer accepts streams
    #[error("conductor is shutting down")]
    ShuttingDown,
}
