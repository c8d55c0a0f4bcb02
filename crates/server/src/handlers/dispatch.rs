//! Per-event dispatch: validate, authorize, hand to the coordinator,
//! reply to the requesting session.
//!
//! Broadcastable results (item mutations, share notifications) carry no
//! direct reply here; they reach every subscriber, including the
//! requester, through the fan-out listener.

use crate::coordinator::snapshot_of;
use crate::error::EventError;
use crate::permission::Action;
use crate::state::AppState;
use tandem_core::event::{
    AddItemPayload, CreateListPayload, DeleteItemPayload, DeleteListPayload, InboundEvent,
    JoinListPayload, OutboundEvent, ShareListPayload, UpdateItemPayload,
};
use tandem_core::validate::{self, FieldError};
use uuid::Uuid;

/// Name of the list created for a user who joins with none.
const DEFAULT_FIRST_LIST_NAME: &str = "My TODOs";

/// Route one authenticated inbound event.
pub async fn handle_event(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    event: InboundEvent,
) -> Result<(), EventError> {
    match event {
        InboundEvent::Join => join(state, session_id, user_id).await,
        InboundEvent::JoinList(payload) => join_list(state, session_id, user_id, payload).await,
        InboundEvent::CreateList(payload) => create_list(state, session_id, user_id, payload).await,
        InboundEvent::ShareList(payload) => share_list(state, session_id, user_id, payload).await,
        InboundEvent::DeleteList(payload) => delete_list(state, user_id, payload).await,
        InboundEvent::AddItem(payload) => add_item(state, user_id, payload).await,
        InboundEvent::UpdateItem(payload) => update_item(state, user_id, payload).await,
        InboundEvent::DeleteItem(payload) => delete_item(state, user_id, payload).await,
    }
}

/// `join`: snapshot and subscribe every list the user belongs to. A user
/// with no lists gets a default one first. The snapshot is queued before
/// the subscription is registered so the session never sees an
/// incremental event for a list ahead of its snapshot.
async fn join(state: &AppState, session_id: Uuid, user_id: Uuid) -> Result<(), EventError> {
    let lists = state.repository.get_lists_for_user(user_id).await?;

    if lists.is_empty() {
        tracing::info!(%user_id, "User has no lists, creating default");
        let entry = state
            .coordinator
            .create_list(user_id, DEFAULT_FIRST_LIST_NAME.to_string())
            .await?;
        state
            .registry
            .send_to(session_id, OutboundEvent::ListSnapshot(snapshot_of(&entry)));
        state.registry.subscribe(session_id, entry.list_id);
        return Ok(());
    }

    for list in lists {
        // One broken list must not block the rest of the join.
        match state.coordinator.snapshot_list(list.id).await {
            Ok(snapshot) => {
                state
                    .registry
                    .send_to(session_id, OutboundEvent::ListSnapshot(snapshot));
                state.registry.subscribe(session_id, list.id);
            }
            Err(e) => {
                tracing::warn!(list_id = %list.id, %user_id, error = %e, "Skipping list during join");
            }
        }
    }
    Ok(())
}

/// `join_list`: read permission, snapshot, subscribe.
async fn join_list(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    payload: JoinListPayload,
) -> Result<(), EventError> {
    state
        .permissions
        .require(user_id, payload.list_id, Action::Read)
        .await?;

    let snapshot = state.coordinator.snapshot_list(payload.list_id).await?;
    state
        .registry
        .send_to(session_id, OutboundEvent::ListSnapshot(snapshot));
    state.registry.subscribe(session_id, payload.list_id);
    tracing::info!(%user_id, list_id = %payload.list_id, "User joined list");
    Ok(())
}

/// `create_list`: no permission gate; the creator becomes the owner.
async fn create_list(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    payload: CreateListPayload,
) -> Result<(), EventError> {
    let name = validate::create_list(&payload).map_err(EventError::Validation)?;
    let entry = state.coordinator.create_list(user_id, name).await?;
    state
        .registry
        .send_to(session_id, OutboundEvent::ListCreated(snapshot_of(&entry)));
    Ok(())
}

/// `share_list`: owner-only; the target learns via the fan-out bus.
async fn share_list(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    payload: ShareListPayload,
) -> Result<(), EventError> {
    let role = validate::share_list(&payload).map_err(EventError::Validation)?;
    if payload.user_id == user_id {
        return Err(EventError::Validation(vec![FieldError::new(
            "user_id",
            "cannot share a list with yourself",
        )]));
    }

    state
        .repository
        .get_list(payload.list_id)
        .await?
        .ok_or_else(|| EventError::NotFound(format!("list {} not found", payload.list_id)))?;

    state
        .permissions
        .require(user_id, payload.list_id, Action::Share)
        .await?;

    state
        .coordinator
        .share_list(payload.list_id, payload.user_id, role)
        .await?;

    state.registry.send_to(
        session_id,
        OutboundEvent::ListShareSuccess {
            list_id: payload.list_id,
            shared_with: payload.user_id,
            message: format!("shared list with user {} as {role}", payload.user_id),
        },
    );
    Ok(())
}

/// `delete_list`: owner-only soft delete; subscribers everywhere learn
/// via the fan-out bus.
async fn delete_list(
    state: &AppState,
    user_id: Uuid,
    payload: DeleteListPayload,
) -> Result<(), EventError> {
    state
        .permissions
        .require(user_id, payload.list_id, Action::Share)
        .await?;
    state.coordinator.delete_list(payload.list_id).await
}

/// `add_item`: always accepted once validated and authorized.
async fn add_item(
    state: &AppState,
    user_id: Uuid,
    payload: AddItemPayload,
) -> Result<(), EventError> {
    let fields = validate::add_item(&payload).map_err(EventError::Validation)?;
    state
        .permissions
        .require(user_id, payload.list_id, Action::Write)
        .await?;

    let (item, _rev) = state.coordinator.add_item(payload.list_id, fields).await?;
    tracing::info!(%user_id, list_id = %payload.list_id, item_id = %item.id, "User added item");
    Ok(())
}

/// `update_item`: revision-checked field merge.
async fn update_item(
    state: &AppState,
    user_id: Uuid,
    payload: UpdateItemPayload,
) -> Result<(), EventError> {
    let patch = validate::update_item(&payload).map_err(EventError::Validation)?;
    state
        .permissions
        .require(user_id, payload.list_id, Action::Write)
        .await?;

    state
        .coordinator
        .update_item(payload.list_id, payload.item_id, patch, payload.rev)
        .await?;
    tracing::info!(%user_id, list_id = %payload.list_id, item_id = %payload.item_id, "User updated item");
    Ok(())
}

/// `delete_item`: always accepted; no revision required.
async fn delete_item(
    state: &AppState,
    user_id: Uuid,
    payload: DeleteItemPayload,
) -> Result<(), EventError> {
    state
        .permissions
        .require(user_id, payload.list_id, Action::Write)
        .await?;

    state
        .coordinator
        .delete_item(payload.list_id, payload.item_id)
        .await?;
    tracing::info!(%user_id, list_id = %payload.list_id, item_id = %payload.item_id, "User deleted item");
    Ok(())
}
