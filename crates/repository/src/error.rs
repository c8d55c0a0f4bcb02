//! Repository error types.

use thiserror::Error;

/// Durable-store operation errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// A stored value failed to decode into the domain model (for example
    /// an unknown status string written by a newer version).
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for repository operations.
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;
