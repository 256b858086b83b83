//! Storage error types.

use thiserror::Error;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The referenced entry does not exist.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// An entry with the same unique key already exists.
    #[error("entry already exists: {0}")]
    Duplicate(String),

    /// The backend failed. Mapped to `server_error` at the protocol
    /// boundary.
    #[error("storage backend error: {0}")]
    Backend(String),
}
