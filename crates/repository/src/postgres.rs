//! PostgreSQL-based durable store implementation.

use crate::error::RepositoryResult;
use crate::models::{ItemRow, ListRow, MemberRow};
use crate::repos::{ItemRepo, ListRepo, MemberRepo};
use crate::store::ListStore;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use tandem_core::model::{MemberRole, Membership, TodoItem, TodoList};
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// PostgreSQL-based durable store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect and migrate. An out-of-band service key, when provided,
    /// overrides the password embedded in the URL.
    pub async fn connect(
        url: &str,
        key: Option<&str>,
        max_connections: u32,
    ) -> RepositoryResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;
        if let Some(key) = key {
            opts = opts.password(key);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl ListStore for PostgresStore {
    async fn migrate(&self) -> RepositoryResult<()> {
        sqlx::raw_sql(POSTGRES_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ListRepo for PostgresStore {
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
        sqlx::query("UPDATE todo_lists SET is_deleted = TRUE WHERE list_id = $1")
            .bind(list_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ItemRepo for PostgresStore {
    async fn add_item(&self, item: &TodoItem) -> RepositoryResult<()> {
        upsert_item_pg(&self.pool, item).await
    }

    async fn update_item(&self, item: &TodoItem) -> RepositoryResult<()> {
        upsert_item_pg(&self.pool, item).await
    }

    async fn soft_delete_item(&self, item_id: Uuid) -> RepositoryResult<()> {
        sqlx::query("UPDATE todo_items SET is_deleted = TRUE WHERE item_id = $1")
            .bind(item_id)
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

async fn upsert_item_pg(pool: &Pool<Postgres>, item: &TodoItem) -> RepositoryResult<()> {
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
impl MemberRepo for PostgresStore {
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
