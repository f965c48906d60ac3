//! Store error types.

use thiserror::Error;

/// Errors returned by [`PayloadStore`](crate::PayloadStore) mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The writer task has stopped; no further mutations are accepted.
    #[error("payload store is closed")]
    Closed,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
