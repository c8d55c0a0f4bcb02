//! Shared-store tier (L2) for Tandem.
//!
//! This crate owns everything that touches the shared key-value store:
//! - The per-list state hash and its codec
//! - The atomic mutation scripts (cache write + fan-out publish in one step)
//! - The pub/sub subscriber used by the cross-node listener
//!
//! The store serializes script execution per key, which is what makes the
//! revision allocation race-free across nodes.

pub mod error;
pub mod pubsub;
pub mod scripts;
pub mod state;

pub use error::{CacheError, CacheResult};
pub use pubsub::{UpdateMessage, UpdateSubscriber};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use scripts::MutationScripts;
use std::future::Future;
use std::time::Duration;
use tandem_core::config::SharedStoreConfig;
use tandem_core::list_state_key;
use tandem_core::model::{ListCacheEntry, TodoItem};
use tandem_core::rev::Rev;
use uuid::Uuid;

/// Client for the shared store.
///
/// Cloning is cheap; the underlying multiplexed connection is shared.
/// Every operation is bounded by the configured op timeout, reported as
/// [`CacheError::Timeout`] so handlers can surface a transient error.
#[derive(Clone)]
pub struct SharedStore {
    client: redis::Client,
    conn: ConnectionManager,
    scripts: std::sync::Arc<MutationScripts>,
    channel: String,
    op_timeout: Duration,
}

impl SharedStore {
    /// Connect and verify the store is reachable.
    pub async fn connect(config: &SharedStoreConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let store = Self {
            client,
            conn,
            scripts: std::sync::Arc::new(MutationScripts::new()),
            channel: config.pubsub_channel.clone(),
            op_timeout: config.op_timeout(),
        };
        store.ping().await?;
        Ok(store)
    }

    /// The fan-out channel this store publishes to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    /// Read the store's wall clock as a revision. Used when rebuilding an
    /// entry from the durable tier, so the fresh revision comes from the
    /// same clock the mutation scripts use.
    pub async fn clock(&self) -> CacheResult<Rev> {
        let mut conn = self.conn.clone();
        let (secs, micros): (i64, i64) = self
            .bounded(async move { redis::cmd("TIME").query_async(&mut conn).await })
            .await?;
        Ok(Rev::new(secs, micros as u32))
    }

    /// Load a list's cached state, if present.
    pub async fn load_list(&self, list_id: Uuid) -> CacheResult<Option<ListCacheEntry>> {
        let mut conn = self.conn.clone();
        let key = list_state_key(list_id);
        let fields = self.bounded(async move { conn.hgetall(key).await }).await?;
        state::entry_from_fields(list_id, fields)
    }

    /// Write a full entry, e.g. on list creation or an L3 rebuild.
    pub async fn seed_list(&self, entry: &ListCacheEntry) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let key = list_state_key(entry.list_id);
        let fields = state::fields_from_entry(entry)?;
        self.bounded(async move { conn.hset_multiple(key, &fields).await })
            .await
    }

    /// Remove a list's state, e.g. on list deletion or a cache flush.
    pub async fn remove_list(&self, list_id: Uuid) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let key = list_state_key(list_id);
        self.bounded(async move { conn.del(key).await }).await
    }

    /// Run the atomic add-item script. Returns the allocated revision.
    pub async fn add_item(&self, list_id: Uuid, item: &TodoItem) -> CacheResult<Rev> {
        let item_json = serde_json::to_string(item)
            .map_err(|e| CacheError::Decode(format!("item {}: {e}", item.id)))?;
        let mut conn = self.conn.clone();
        let script = self.scripts.clone();
        let key = list_state_key(list_id);
        let channel = self.channel.clone();
        let raw: String = self
            .bounded_script(async move {
                script
                    .add_item
                    .key(key)
                    .arg(item.id.to_string())
                    .arg(item_json)
                    .arg(channel)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        parse_rev(&raw)
    }

    /// Run the atomic update-item script. Fails with [`CacheError::ListNotFound`]
    /// or [`CacheError::ItemNotFound`] when the target is absent.
    pub async fn update_item(&self, list_id: Uuid, item: &TodoItem) -> CacheResult<Rev> {
        let item_json = serde_json::to_string(item)
            .map_err(|e| CacheError::Decode(format!("item {}: {e}", item.id)))?;
        let mut conn = self.conn.clone();
        let script = self.scripts.clone();
        let key = list_state_key(list_id);
        let channel = self.channel.clone();
        let raw: String = self
            .bounded_script(async move {
                script
                    .update_item
                    .key(key)
                    .arg(item.id.to_string())
                    .arg(item_json)
                    .arg(channel)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        parse_rev(&raw)
    }

    /// Run the atomic delete-item script (tombstone write).
    pub async fn delete_item(&self, list_id: Uuid, item_id: Uuid) -> CacheResult<Rev> {
        let mut conn = self.conn.clone();
        let script = self.scripts.clone();
        let key = list_state_key(list_id);
        let channel = self.channel.clone();
        let raw: String = self
            .bounded_script(async move {
                script
                    .delete_item
                    .key(key)
                    .arg(item_id.to_string())
                    .arg(channel)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        parse_rev(&raw)
    }

    /// Publish a coordinator-originated message (share, list deletion).
    pub async fn publish(&self, message: &UpdateMessage) -> CacheResult<()> {
        let payload = serde_json::to_string(message)
            .map_err(|e| CacheError::Decode(format!("update message: {e}")))?;
        let mut conn = self.conn.clone();
        let channel = self.channel.clone();
        self.bounded(async move { conn.publish(channel, payload).await })
            .await
    }

    /// Open a dedicated subscriber connection on the fan-out channel.
    pub async fn subscribe(&self) -> CacheResult<UpdateSubscriber> {
        UpdateSubscriber::new(&self.client, &self.channel).await
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> CacheResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Redis(e)),
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }

    async fn bounded_script<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> CacheResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_script_error(e)),
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }
}

fn parse_rev(raw: &str) -> CacheResult<Rev> {
    raw.parse()
        .map_err(|_| CacheError::Decode(format!("bad revision from script: {raw:?}")))
}

/// Map the distinguished script error replies onto the error taxonomy.
fn map_script_error(e: redis::RedisError) -> CacheError {
    let text = e.to_string();
    if text.contains("list not found") {
        CacheError::ListNotFound
    } else if text.contains("item not found") {
        CacheError::ItemNotFound
    } else {
        CacheError::Redis(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rev_accepts_script_output() {
        let rev = parse_rev("1730484792.000042").unwrap();
        assert_eq!(rev.to_string(), "1730484792.000042");
        assert!(parse_rev("List not found").is_err());
    }

    #[test]
    fn script_error_replies_map_to_taxonomy() {
        let err = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "script failed",
            "item not found".to_string(),
        ));
        assert!(matches!(map_script_error(err), CacheError::ItemNotFound));

        let err = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "script failed",
            "list not found".to_string(),
        ));
        assert!(matches!(map_script_error(err), CacheError::ListNotFound));
    }
}
