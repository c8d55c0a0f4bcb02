//! Permission service behavior against a real membership table.

use std::sync::Arc;
use tandem_core::model::{MemberRole, TodoList};
use tandem_repository::{ListRepo, MemberRepo, SqliteStore};
use tandem_server::permission::{Action, PermissionService};
use time::OffsetDateTime;
use uuid::Uuid;

async fn fixture() -> (Arc<SqliteStore>, PermissionService, Uuid) {
    let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let now = OffsetDateTime::now_utc();
    let list = TodoList {
        id: Uuid::new_v4(),
        name: "Groceries".to_string(),
        owner_id: Uuid::new_v4(),
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };
    store.create_list(&list).await.unwrap();
    let service = PermissionService::new(store.clone());
    (store, service, list.id)
}

async fn member(store: &SqliteStore, list_id: Uuid, role: MemberRole) -> Uuid {
    let user_id = Uuid::new_v4();
    store.add_member(list_id, user_id, role).await.unwrap();
    user_id
}

#[tokio::test]
async fn owner_may_do_everything() {
    let (store, service, list_id) = fixture().await;
    let owner = member(&store, list_id, MemberRole::Owner).await;

    for action in [Action::Read, Action::Write, Action::Share] {
        service.require(owner, list_id, action).await.unwrap();
    }
}

#[tokio::test]
async fn editor_reads_and_writes_but_cannot_share() {
    let (store, service, list_id) = fixture().await;
    let editor = member(&store, list_id, MemberRole::Editor).await;

    service.require(editor, list_id, Action::Read).await.unwrap();
    service.require(editor, list_id, Action::Write).await.unwrap();

    let err = service
        .require(editor, list_id, Action::Share)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "permission_denied");
}

#[tokio::test]
async fn viewer_only_reads() {
    let (store, service, list_id) = fixture().await;
    let viewer = member(&store, list_id, MemberRole::Viewer).await;

    service.require(viewer, list_id, Action::Read).await.unwrap();
    for action in [Action::Write, Action::Share] {
        let err = service.require(viewer, list_id, action).await.unwrap_err();
        assert_eq!(err.kind(), "permission_denied");
    }
}

#[tokio::test]
async fn non_member_gets_nothing() {
    let (_store, service, list_id) = fixture().await;
    let outsider = Uuid::new_v4();

    for action in [Action::Read, Action::Write, Action::Share] {
        let err = service.require(outsider, list_id, action).await.unwrap_err();
        assert_eq!(err.kind(), "permission_denied");
    }
}

#[tokio::test]
async fn role_upgrade_takes_effect_immediately() {
    let (store, service, list_id) = fixture().await;
    let user = member(&store, list_id, MemberRole::Viewer).await;
    assert!(service.require(user, list_id, Action::Write).await.is_err());

    store
        .add_member(list_id, user, MemberRole::Editor)
        .await
        .unwrap();
    service.require(user, list_id, Action::Write).await.unwrap();
}
