//! Shared-store error types.

use std::time::Duration;
use thiserror::Error;

/// Shared-store operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The mutation script found no state under the list key.
    #[error("list not found")]
    ListNotFound,

    /// The mutation script found no such item in the list's items map.
    #[error("item not found")]
    ItemNotFound,

    #[error("shared store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("decode error: {0}")]
    Decode(String),

    /// Operation exceeded the configured shared-store timeout.
    #[error("shared store timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for shared-store operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
