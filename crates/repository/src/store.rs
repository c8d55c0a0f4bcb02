//! Combined store trait and the SQLite implementation.

use crate::error::RepositoryResult;
use crate::models::{ItemRow, ListRow, MemberRow};
use crate::repos::{ItemRepo, ListRepo, MemberRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tandem_core::model::{MemberRole, Membership, TodoItem, TodoList};
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined durable store trait (C1).
#[async_trait]
pub trait ListStore: ListRepo + ItemRepo + MemberRepo + Send + Sync {
    /// Create tables and indexes if missing.
    async fn migrate(&self) -> RepositoryResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> RepositoryResult<()>;
}

/// SQLite schema (embedded).
const SQLITE_SCHEMA: &str = include_str!("sqlite_schema.sql");

/// SQLite-based durable store, for development and tests.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) and migrate a SQLite store.
    pub async fn connect(url: &str) -> RepositoryResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent lock failures under the async runtime.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl ListStore for SqliteStore {
    async fn migrate(&self) -> RepositoryResult<()> {
        sqlx::raw_sql(SQLITE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ListRepo for SqliteStore {
    async fn create_list(&self, list: &TodoList) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO todo_lists (list_id, list_name, owner_id, is_deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (list_id) DO UPDATE SET
                list_name = excluded.list_name,
                owner_id = excluded.owner_id,
                is_deleted = excluded.is_deleted,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(list.id)
        .bind(&list.name)
        .bind(list.owner_id)
        .bind(list.is_deleted)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_list(&self, list_id: Uuid) -> RepositoryResult<Option<TodoList>> {
        let row = sqlx::query_as::<_, ListRow>(
            "SELECT * FROM todo_lists WHERE list_id = $1 AND is_deleted = FALSE",
        )
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TodoList::from))
    }

    async fn get_lists_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<TodoList>> {
        let rows = sqlx::query_as::<_, ListRow>(
            r#"
            SELECT l.*
            FROM todo_lists l
            JOIN todo_list_members m ON m.list_id = l.list_id
            WHERE m.user_id = $1 AND l.is_deleted = FALSE
            ORDER BY l.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TodoList::from).collect())
    }

    async fn soft_delete_list(&self, list_id: Uuid) -> RepositoryResult<()> {
        sqlx::query("UPDATE todo_lists SET is_deleted = TRUE, updated_at = $2 WHERE list_id = $1")
            .bind(list_id)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ItemRepo for SqliteStore {
    async fn add_item(&self, item: &TodoItem) -> RepositoryResult<()> {
        upsert_item_sqlite(&self.pool, item).await
    }

    async fn update_item(&self, item: &TodoItem) -> RepositoryResult<()> {
        upsert_item_sqlite(&self.pool, item).await
    }

    async fn soft_delete_item(&self, item_id: Uuid) -> RepositoryResult<()> {
        sqlx::query("UPDATE todo_items SET is_deleted = TRUE, updated_at = $2 WHERE item_id = $1")
            .bind(item_id)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_item(&self, item_id: Uuid) -> RepositoryResult<Option<TodoItem>> {
        let row = sqlx::query_as::<_, ItemRow>(
            "SELECT * FROM todo_items WHERE item_id = $1 AND is_deleted = FALSE",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TodoItem::try_from).transpose()
    }

    async fn get_items_for_list(&self, list_id: Uuid) -> RepositoryResult<Vec<TodoItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT * FROM todo_items WHERE list_id = $1 AND is_deleted = FALSE ORDER BY created_at",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TodoItem::try_from).collect()
    }
}

async fn upsert_item_sqlite(pool: &Pool<Sqlite>, item: &TodoItem) -> RepositoryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO todo_items
            (item_id, list_id, name, description, status, done, due_date, media_url,
             is_deleted, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (item_id) DO UPDATE SET
            list_id = excluded.list_id,
            name = excluded.name,
            description = excluded.description,
            status = excluded.status,
            done = excluded.done,
            due_date = excluded.due_date,
            media_url = excluded.media_url,
            is_deleted = excluded.is_deleted,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(item.id)
    .bind(item.list_id)
    .bind(&item.name)
    .bind(&item.description)
    .bind(item.status.as_str())
    .bind(item.done)
    .bind(item.due_date)
    .bind(&item.media_url)
    .bind(item.is_deleted)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl MemberRepo for SqliteStore {
    async fn add_member(
        &self,
        list_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO todo_list_members (list_id, user_id, role, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (list_id, user_id) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(list_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_member(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> RepositoryResult<Option<Membership>> {
        let row = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM todo_list_members WHERE list_id = $1 AND user_id = $2",
        )
        .bind(list_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Membership::try_from).transpose()
    }

    async fn list_members(&self, list_id: Uuid) -> RepositoryResult<Vec<Membership>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM todo_list_members WHERE list_id = $1 ORDER BY created_at",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Membership::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::model::ItemStatus;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn list(owner_id: Uuid) -> TodoList {
        let now = OffsetDateTime::now_utc();
        TodoList {
            id: Uuid::new_v4(),
            name: "Groceries".to_string(),
            owner_id,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(list_id: Uuid) -> TodoItem {
        let now = OffsetDateTime::now_utc();
        TodoItem {
            id: Uuid::new_v4(),
            list_id,
            name: "Milk".to_string(),
            description: Some("2%".to_string()),
            status: ItemStatus::NotStarted,
            done: false,
            due_date: None,
            media_url: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_get_list() {
        let store = store().await;
        let owner = Uuid::new_v4();
        let list = list(owner);
        store.create_list(&list).await.unwrap();

        let fetched = store.get_list(list.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Groceries");
        assert_eq!(fetched.owner_id, owner);
    }

    #[tokio::test]
    async fn create_list_replay_is_idempotent() {
        let store = store().await;
        let list = list(Uuid::new_v4());
        store.create_list(&list).await.unwrap();
        store.create_list(&list).await.unwrap();

        let fetched = store.get_list(list.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, list.id);
        assert_eq!(fetched.created_at, list.created_at);
    }

    #[tokio::test]
    async fn soft_deleted_list_is_hidden() {
        let store = store().await;
        let list = list(Uuid::new_v4());
        store.create_list(&list).await.unwrap();
        store.soft_delete_list(list.id).await.unwrap();
        assert!(store.get_list(list.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn item_upsert_replay_yields_same_row() {
        let store = store().await;
        let list = list(Uuid::new_v4());
        store.create_list(&list).await.unwrap();

        let item = item(list.id);
        store.add_item(&item).await.unwrap();
        store.add_item(&item).await.unwrap();
        store.update_item(&item).await.unwrap();

        let items = store.get_items_for_list(list.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0], item);
    }

    #[tokio::test]
    async fn update_item_replaces_fields() {
        let store = store().await;
        let list = list(Uuid::new_v4());
        store.create_list(&list).await.unwrap();

        let mut item = item(list.id);
        store.add_item(&item).await.unwrap();

        item.status = ItemStatus::Completed;
        item.done = true;
        store.update_item(&item).await.unwrap();

        let fetched = store.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ItemStatus::Completed);
        assert!(fetched.done);
    }

    #[tokio::test]
    async fn soft_deleted_item_is_hidden() {
        let store = store().await;
        let list = list(Uuid::new_v4());
        store.create_list(&list).await.unwrap();

        let item = item(list.id);
        store.add_item(&item).await.unwrap();
        store.soft_delete_item(item.id).await.unwrap();

        assert!(store.get_item(item.id).await.unwrap().is_none());
        assert!(store.get_items_for_list(list.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn membership_upsert_updates_role() {
        let store = store().await;
        let list = list(Uuid::new_v4());
        store.create_list(&list).await.unwrap();

        let user = Uuid::new_v4();
        store
            .add_member(list.id, user, MemberRole::Viewer)
            .await
            .unwrap();
        store
            .add_member(list.id, user, MemberRole::Editor)
            .await
            .unwrap();

        let member = store.get_member(list.id, user).await.unwrap().unwrap();
        assert_eq!(member.role, MemberRole::Editor);
        assert_eq!(store.list_members(list.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lists_for_user_follow_membership() {
        let store = store().await;
        let owner = Uuid::new_v4();
        let outsider = Uuid::new_v4();

        let list = list(owner);
        store.create_list(&list).await.unwrap();
        store
            .add_member(list.id, owner, MemberRole::Owner)
            .await
            .unwrap();

        assert_eq!(store.get_lists_for_user(owner).await.unwrap().len(), 1);
        assert!(store.get_lists_for_user(outsider).await.unwrap().is_empty());
    }
}
