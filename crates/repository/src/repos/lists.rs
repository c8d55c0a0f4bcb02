//! List repository trait.

use crate::error::RepositoryResult;
use async_trait::async_trait;
use tandem_core::model::TodoList;
use uuid::Uuid;

/// Repository for `todo_lists`.
#[async_trait]
pub trait ListRepo: Send + Sync {
    /// Upsert a list keyed by `list.id`. `created_at` is preserved on
    /// replay; every other column takes the new value.
    async fn create_list(&self, list: &TodoList) -> RepositoryResult<()>;

    /// Get a list by id. Soft-deleted lists are not returned.
    async fn get_list(&self, list_id: Uuid) -> RepositoryResult<Option<TodoList>>;

    /// All non-deleted lists the user is a member of (any role).
    async fn get_lists_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<TodoList>>;

    /// Mark a list deleted. Idempotent; missing rows are not an error.
    async fn soft_delete_list(&self, list_id: Uuid) -> RepositoryResult<()>;
}
