//! Durable-store repository layer for Tandem.
//!
//! This crate provides the system-of-record data model:
//! - Todo lists and soft deletion
//! - Todo items keyed by list
//! - List membership and roles
//!
//! Every write is an upsert keyed by primary identifier, so replays from
//! the write-behind queue are safe.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{RepositoryError, RepositoryResult};
pub use postgres::PostgresStore;
pub use repos::{ItemRepo, ListRepo, MemberRepo};
pub use store::{ListStore, SqliteStore};

use std::sync::Arc;
use tandem_core::config::DurableStoreConfig;

/// Create a durable store from configuration. The backend is selected by
/// URL scheme: `postgres://` (or `postgresql://`) and `sqlite:`.
pub async fn from_config(config: &DurableStoreConfig) -> RepositoryResult<Arc<dyn ListStore>> {
    let url = config.url.as_str();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let store = PostgresStore::connect(
            url,
            config.key.as_deref(),
            config.max_connections,
        )
        .await?;
        Ok(Arc::new(store) as Arc<dyn ListStore>)
    } else if url.starts_with("sqlite:") {
        let store = SqliteStore::connect(url).await?;
        Ok(Arc::new(store) as Arc<dyn ListStore>)
    } else {
        Err(RepositoryError::Config(format!(
            "unsupported durable store url: {url}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_builds_sqlite_store() {
        let config = DurableStoreConfig {
            url: "sqlite::memory:".to_string(),
            key: None,
            max_connections: 1,
        };
        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn from_config_rejects_unknown_scheme() {
        let config = DurableStoreConfig {
            url: "mysql://nope".to_string(),
            key: None,
            max_connections: 1,
        };
        assert!(from_config(&config).await.is_err());
    }
}
