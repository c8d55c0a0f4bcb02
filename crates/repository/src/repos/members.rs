//! Membership repository trait.

use crate::error::RepositoryResult;
use async_trait::async_trait;
use tandem_core::model::{MemberRole, Membership};
use uuid::Uuid;

/// Repository for `todo_list_members`.
#[async_trait]
pub trait MemberRepo: Send + Sync {
    /// Insert or update a membership keyed by `(list_id, user_id)`.
    async fn add_member(
        &self,
        list_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> RepositoryResult<()>;

    /// Get one membership record.
    async fn get_member(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> RepositoryResult<Option<Membership>>;

    /// All members of a list.
    async fn list_members(&self, list_id: Uuid) -> RepositoryResult<Vec<Membership>>;
}
