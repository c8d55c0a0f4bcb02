//! Item repository trait.

use crate::error::RepositoryResult;
use async_trait::async_trait;
use tandem_core::model::TodoItem;
use uuid::Uuid;

/// Repository for `todo_items`.
#[async_trait]
pub trait ItemRepo: Send + Sync {
    /// Upsert a new item keyed by `item.id`.
    async fn add_item(&self, item: &TodoItem) -> RepositoryResult<()>;

    /// Upsert the full merged item. Identical to [`ItemRepo::add_item`] at
    /// the SQL level; kept separate so worker metrics can tell the
    /// operations apart.
    async fn update_item(&self, item: &TodoItem) -> RepositoryResult<()>;

    /// Mark an item deleted. Idempotent; missing rows are not an error.
    async fn soft_delete_item(&self, item_id: Uuid) -> RepositoryResult<()>;

    /// Get an item by id. Soft-deleted items are not returned.
    async fn get_item(&self, item_id: Uuid) -> RepositoryResult<Option<TodoItem>>;

    /// All non-deleted items in a list.
    async fn get_items_for_list(&self, list_id: Uuid) -> RepositoryResult<Vec<TodoItem>>;
}
