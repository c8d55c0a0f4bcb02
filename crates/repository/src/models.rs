//! Database rows mapping to the durable schema.

use crate::error::RepositoryError;
use sqlx::FromRow;
use tandem_core::model::{Membership, TodoItem, TodoList};
use time::OffsetDateTime;
use uuid::Uuid;

/// Row in `todo_lists`.
#[derive(Debug, Clone, FromRow)]
pub struct ListRow {
    pub list_id: Uuid,
    pub list_name: String,
    pub owner_id: Uuid,
    pub is_deleted: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row in `todo_items`.
#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub item_id: Uuid,
    pub list_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub done: bool,
    pub due_date: Option<OffsetDateTime>,
    pub media_url: Option<String>,
    pub is_deleted: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row in `todo_list_members`.
#[derive(Debug, Clone, FromRow)]
pub struct MemberRow {
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: OffsetDateTime,
}

impl From<ListRow> for TodoList {
    fn from(row: ListRow) -> Self {
        TodoList {
            id: row.list_id,
            name: row.list_name,
            owner_id: row.owner_id,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl TryFrom<ItemRow> for TodoItem {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|message| {
            RepositoryError::Corrupt(format!("item {}: {message}", row.item_id))
        })?;
        Ok(TodoItem {
            id: row.item_id,
            list_id: row.list_id,
            name: row.name,
            description: row.description,
            status,
            done: row.done,
            due_date: row.due_date,
            media_url: row.media_url,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<MemberRow> for Membership {
    type Error = RepositoryError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let role = row.role.parse().map_err(|message| {
            RepositoryError::Corrupt(format!(
                "member ({}, {}): {message}",
                row.list_id, row.user_id
            ))
        })?;
        Ok(Membership {
            list_id: row.list_id,
            user_id: row.user_id,
            role,
            created_at: row.created_at,
        })
    }
}
