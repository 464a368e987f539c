//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record key is empty or has a component outside `[A-Za-z0-9_.-]`.
    #[error("Invalid record key: {0:?}")]
    InvalidKey(String),

    /// The backend root exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
