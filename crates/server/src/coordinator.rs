//! The coordinator: read-through and write-through across the three tiers.
//!
//! Reads resolve L1 → L2 → L3 and repopulate the colder tiers on the way
//! back. Item writes go through the shared store's atomic scripts, which
//! also publish the fan-out message; the local L1 apply is idempotent
//! against the echo arriving via the listener. Durable persistence is
//! handed to the write-behind worker, except for list creation, sharing,
//! and deletion, which need the durable row synchronously.

use crate::error::EventError;
use crate::metrics;
use crate::state::ListCache;
use crate::writer::{WriteOp, WriterHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tandem_cache::{SharedStore, UpdateMessage};
use tandem_core::event::ListSnapshot;
use tandem_core::model::{
    ItemPatch, ListCacheEntry, MemberRole, Membership, TodoItem, TodoList,
};
use tandem_core::rev::Rev;
use tandem_core::validate::NewItemFields;
use tandem_repository::ListStore;
use time::OffsetDateTime;
use uuid::Uuid;

pub struct Coordinator {
    repository: Arc<dyn ListStore>,
    shared: SharedStore,
    cache: Arc<ListCache>,
    writer: WriterHandle,
}

impl Coordinator {
    pub fn new(
        repository: Arc<dyn ListStore>,
        shared: SharedStore,
        cache: Arc<ListCache>,
        writer: WriterHandle,
    ) -> Self {
        Self {
            repository,
            shared,
            cache,
            writer,
        }
    }

    /// Resolve a list's state, loading colder tiers as needed.
    ///
    /// `client_rev` is the newest revision the client claims to have seen.
    /// A client ahead of the cached revision means the shared store lost
    /// state (restart or flush), so the entry is rebuilt from the durable
    /// tier with a fresh revision. This self-heals cold tiers.
    pub async fn check_and_load_list_cache(
        &self,
        list_id: Uuid,
        client_rev: Option<Rev>,
    ) -> Result<ListCacheEntry, EventError> {
        if let Some(entry) = self.cache.get(list_id) {
            metrics::CACHE_READS.with_label_values(&["l1"]).inc();
            return Ok(entry);
        }

        match self.shared.load_list(list_id).await? {
            Some(entry) => {
                if client_rev.is_some_and(|rev| rev > entry.rev) {
                    return self.rebuild_from_durable(list_id).await;
                }
                metrics::CACHE_READS.with_label_values(&["l2"]).inc();
                self.cache.put(entry.clone());
                Ok(entry)
            }
            None => self.rebuild_from_durable(list_id).await,
        }
    }

    /// Cold start: rebuild the entry from the durable store, seed L2 with
    /// a fresh revision from the store clock, populate L1.
    async fn rebuild_from_durable(&self, list_id: Uuid) -> Result<ListCacheEntry, EventError> {
        metrics::CACHE_READS.with_label_values(&["l3"]).inc();
        tracing::info!(%list_id, "Rebuilding list state from the durable store");

        let list = self
            .repository
            .get_list(list_id)
            .await?
            .ok_or_else(|| EventError::NotFound(format!("list {list_id} not found")))?;
        let items = self.repository.get_items_for_list(list_id).await?;

        let rev = self.shared.clock().await?;
        let entry = ListCacheEntry {
            list_id,
            list_name: list.name,
            owner_id: list.owner_id,
            items: items.into_iter().map(|item| (item.id, Some(item))).collect(),
            rev,
            updated_at: rev.secs(),
        };

        self.shared.seed_list(&entry).await?;
        self.cache.put(entry.clone());
        Ok(entry)
    }

    /// Current snapshot of a list for client delivery.
    pub async fn snapshot_list(&self, list_id: Uuid) -> Result<ListSnapshot, EventError> {
        let entry = self.check_and_load_list_cache(list_id, None).await?;
        Ok(snapshot_of(&entry))
    }

    /// Add an item: atomic script, local L1 apply, write-behind enqueue.
    pub async fn add_item(
        &self,
        list_id: Uuid,
        fields: NewItemFields,
    ) -> Result<(TodoItem, Rev), EventError> {
        self.check_and_load_list_cache(list_id, None).await?;

        let now = OffsetDateTime::now_utc();
        let item = TodoItem {
            id: Uuid::new_v4(),
            list_id,
            name: fields.name,
            description: fields.description,
            status: fields.status,
            done: fields.done,
            due_date: fields.due_date,
            media_url: fields.media_url,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        let rev = self.shared.add_item(list_id, &item).await?;
        self.cache
            .with_entry(list_id, |entry| entry.apply_item(item.clone(), rev));
        self.writer.enqueue(WriteOp::AddItem(item.clone()));

        tracing::info!(%list_id, item_id = %item.id, %rev, "Item added");
        Ok((item, rev))
    }

    /// Update an item after the revision check. The patch is merged over
    /// the current snapshot (absent fields are preserved) with the
    /// `done`/`status` coupling applied here, not in handlers.
    pub async fn update_item(
        &self,
        list_id: Uuid,
        item_id: Uuid,
        patch: ItemPatch,
        client_rev: Option<Rev>,
    ) -> Result<(TodoItem, Rev), EventError> {
        let entry = self.check_and_load_list_cache(list_id, client_rev).await?;

        if let Some(client) = client_rev {
            if client < entry.rev {
                metrics::REVISION_CONFLICTS.inc();
                tracing::debug!(
                    %list_id, %item_id, client_rev = %client, server_rev = %entry.rev,
                    "Rejecting stale update"
                );
                return Err(EventError::RevisionConflict {
                    client,
                    current: entry.rev,
                    snapshot: Box::new(snapshot_of(&entry)),
                });
            }
        }

        let current = entry
            .live_item(item_id)
            .ok_or_else(|| EventError::NotFound(format!("item {item_id} not found")))?;

        let patch = patch.normalized(current);
        let mut updated = current.clone();
        patch.apply_to(&mut updated, OffsetDateTime::now_utc());

        let rev = self.shared.update_item(list_id, &updated).await?;
        self.cache
            .with_entry(list_id, |entry| entry.apply_item(updated.clone(), rev));
        self.writer.enqueue(WriteOp::UpdateItem(updated.clone()));

        tracing::info!(%list_id, %item_id, %rev, "Item updated");
        Ok((updated, rev))
    }

    /// Delete an item: tombstone in the shared tier, soft delete behind.
    pub async fn delete_item(&self, list_id: Uuid, item_id: Uuid) -> Result<Rev, EventError> {
        self.check_and_load_list_cache(list_id, None).await?;

        let rev = self.shared.delete_item(list_id, item_id).await?;
        self.cache
            .with_entry(list_id, |entry| entry.apply_tombstone(item_id, rev));
        self.writer.enqueue(WriteOp::DeleteItem { item_id });

        tracing::info!(%list_id, %item_id, %rev, "Item deleted");
        Ok(rev)
    }

    /// Create a list. The durable write is synchronous because the new
    /// list id is the return value; then the empty entry seeds L2 and L1.
    pub async fn create_list(
        &self,
        owner_id: Uuid,
        name: String,
    ) -> Result<ListCacheEntry, EventError> {
        let now = OffsetDateTime::now_utc();
        let list = TodoList {
            id: Uuid::new_v4(),
            name,
            owner_id,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.repository.create_list(&list).await?;
        self.repository
            .add_member(list.id, owner_id, MemberRole::Owner)
            .await?;

        let rev = self.shared.clock().await?;
        let entry = ListCacheEntry {
            list_id: list.id,
            list_name: list.name,
            owner_id,
            items: HashMap::new(),
            rev,
            updated_at: rev.secs(),
        };
        self.shared.seed_list(&entry).await?;
        self.cache.put(entry.clone());

        tracing::info!(list_id = %entry.list_id, %owner_id, "List created");
        Ok(entry)
    }

    /// Share a list: synchronous membership upsert, then a fan-out message
    /// carrying the member and a full snapshot so the recipient's node can
    /// seed its tiers.
    pub async fn share_list(
        &self,
        list_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<(), EventError> {
        self.repository.add_member(list_id, user_id, role).await?;

        let entry = self.check_and_load_list_cache(list_id, None).await?;
        let member = Membership {
            list_id,
            user_id,
            role,
            created_at: OffsetDateTime::now_utc(),
        };
        self.shared
            .publish(&UpdateMessage::ListShared {
                list_id,
                member,
                snapshot: entry,
            })
            .await?;

        tracing::info!(%list_id, %user_id, role = %role, "List shared");
        Ok(())
    }

    /// Soft-delete a list everywhere: durable row synchronously, shared
    /// key removed, L1 dropped, deletion fanned out.
    pub async fn delete_list(&self, list_id: Uuid) -> Result<(), EventError> {
        self.repository.soft_delete_list(list_id).await?;
        self.shared.remove_list(list_id).await?;
        self.cache.drop_list(list_id);
        self.shared
            .publish(&UpdateMessage::ListDeleted { list_id })
            .await?;

        tracing::info!(%list_id, "List deleted");
        Ok(())
    }

    /// Drop every L1 entry and this node's corresponding L2 keys. Manual
    /// recovery tool; the next read-through rebuilds from the durable tier.
    pub async fn flush_cache(&self) -> Result<usize, EventError> {
        let ids = self.cache.flush_all();
        let count = ids.len();
        for list_id in ids {
            self.shared.remove_list(list_id).await?;
        }
        tracing::info!(lists = count, "Cache flushed");
        Ok(count)
    }
}

/// Client-facing snapshot: live items only, current revision.
pub fn snapshot_of(entry: &ListCacheEntry) -> ListSnapshot {
    ListSnapshot {
        list_id: entry.list_id,
        list_name: entry.list_name.clone(),
        items: entry.live_items(),
        rev: entry.rev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_drops_tombstones_and_keeps_rev() {
        let list_id = Uuid::new_v4();
        let now = OffsetDateTime::UNIX_EPOCH;
        let item = TodoItem {
            id: Uuid::new_v4(),
            list_id,
            name: "Milk".to_string(),
            description: None,
            status: Default::default(),
            done: false,
            due_date: None,
            media_url: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        let mut entry = ListCacheEntry {
            list_id,
            list_name: "Groceries".to_string(),
            owner_id: Uuid::new_v4(),
            items: HashMap::new(),
            rev: Rev::ZERO,
            updated_at: 0,
        };
        entry.apply_item(item.clone(), "10.000000".parse().unwrap());
        entry.apply_tombstone(Uuid::new_v4(), "11.000000".parse().unwrap());

        let snapshot = snapshot_of(&entry);
        assert_eq!(snapshot.items.len(), 1);
        assert!(snapshot.items.contains_key(&item.id));
        assert_eq!(snapshot.rev, entry.rev);
    }
}
