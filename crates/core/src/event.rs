//! Wire events for the message socket.
//!
//! Every frame is a named event with a single JSON object payload:
//! `{"event": "add_item", "data": {...}}`. Client-originated and
//! server-originated events share one name space; both sides are modelled
//! as tagged unions so dispatch is a plain `match`.

use crate::model::TodoItem;
use crate::rev::Rev;
use crate::validate::FieldError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Events accepted from clients.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    Join,
    JoinList(JoinListPayload),
    CreateList(CreateListPayload),
    ShareList(ShareListPayload),
    DeleteList(DeleteListPayload),
    AddItem(AddItemPayload),
    UpdateItem(UpdateItemPayload),
    DeleteItem(DeleteItemPayload),
}

impl InboundEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::JoinList(_) => "join_list",
            Self::CreateList(_) => "create_list",
            Self::ShareList(_) => "share_list",
            Self::DeleteList(_) => "delete_list",
            Self::AddItem(_) => "add_item",
            Self::UpdateItem(_) => "update_item",
            Self::DeleteItem(_) => "delete_item",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct JoinListPayload {
    pub list_id: Uuid,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateListPayload {
    #[serde(default)]
    pub list_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ShareListPayload {
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeleteListPayload {
    pub list_id: Uuid,
}

/// Payload for `add_item`. Status, done, and due date are free-form here;
/// the validation schema narrows them before the handler proceeds.
#[derive(Clone, Debug, Deserialize)]
pub struct AddItemPayload {
    pub list_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateItemPayload {
    pub list_id: Uuid,
    pub item_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    /// Last revision the client observed; absent means "accept".
    #[serde(default)]
    pub rev: Option<Rev>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeleteItemPayload {
    pub list_id: Uuid,
    pub item_id: Uuid,
}

/// Full state message for a single list, used to reconcile a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub list_id: Uuid,
    pub list_name: String,
    pub items: HashMap<Uuid, TodoItem>,
    pub rev: Rev,
}

/// Events pushed to clients.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    Connected {
        user_id: Uuid,
        session_id: Uuid,
    },
    ListSnapshot(ListSnapshot),
    ListCreated(ListSnapshot),
    ItemAdded {
        list_id: Uuid,
        item: TodoItem,
        rev: Rev,
    },
    ItemUpdated {
        list_id: Uuid,
        item: TodoItem,
        rev: Rev,
    },
    ItemDeleted {
        list_id: Uuid,
        item_id: Uuid,
        rev: Rev,
    },
    ListShareSuccess {
        list_id: Uuid,
        shared_with: Uuid,
        message: String,
    },
    ListSharedWithYou {
        list_id: Uuid,
        message: String,
    },
    ListDeleted {
        list_id: Uuid,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
    AuthError {
        message: String,
    },
    PermissionError {
        message: String,
    },
    ValidationError {
        message: String,
        errors: Vec<FieldError>,
    },
}

impl OutboundEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ListSnapshot(_) => "list_snapshot",
            Self::ListCreated(_) => "list_created",
            Self::ItemAdded { .. } => "item_added",
            Self::ItemUpdated { .. } => "item_updated",
            Self::ItemDeleted { .. } => "item_deleted",
            Self::ListShareSuccess { .. } => "list_share_success",
            Self::ListSharedWithYou { .. } => "list_shared_with_you",
            Self::ListDeleted { .. } => "list_deleted",
            Self::Error { .. } => "error",
            Self::AuthError { .. } => "auth_error",
            Self::PermissionError { .. } => "permission_error",
            Self::ValidationError { .. } => "validation_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frames_decode_by_event_name() {
        let frame = serde_json::json!({
            "event": "add_item",
            "data": {"list_id": Uuid::nil(), "name": "Milk", "description": ""}
        });
        let event: InboundEvent = serde_json::from_value(frame).unwrap();
        match event {
            InboundEvent::AddItem(payload) => {
                assert_eq!(payload.name, "Milk");
                assert_eq!(payload.description.as_deref(), Some(""));
                assert!(payload.status.is_none());
            }
            other => panic!("decoded wrong event: {}", other.name()),
        }
    }

    #[test]
    fn join_frame_needs_no_payload() {
        let event: InboundEvent = serde_json::from_str(r#"{"event": "join"}"#).unwrap();
        assert_eq!(event.name(), "join");
    }

    #[test]
    fn unknown_event_is_rejected() {
        let result = serde_json::from_str::<InboundEvent>(r#"{"event": "list_synced", "data": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_accepts_string_or_numeric_rev() {
        for rev in ["\"80\"", "80.5"] {
            let frame = format!(
                r#"{{"event": "update_item", "data": {{"list_id": "{id}", "item_id": "{id}", "done": true, "rev": {rev}}}}}"#,
                id = Uuid::nil()
            );
            let event: InboundEvent = serde_json::from_str(&frame).unwrap();
            match event {
                InboundEvent::UpdateItem(payload) => assert!(payload.rev.is_some()),
                other => panic!("decoded wrong event: {}", other.name()),
            }
        }
    }

    #[test]
    fn outbound_error_omits_absent_kind() {
        let event = OutboundEvent::Error {
            message: "boom".to_string(),
            kind: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "error");
        assert!(json["data"].get("kind").is_none());
    }

    #[test]
    fn outbound_snapshot_shape() {
        let snapshot = ListSnapshot {
            list_id: Uuid::nil(),
            list_name: "Groceries".to_string(),
            items: HashMap::new(),
            rev: "100.000000".parse().unwrap(),
        };
        let json = serde_json::to_value(OutboundEvent::ListSnapshot(snapshot)).unwrap();
        assert_eq!(json["event"], "list_snapshot");
        assert_eq!(json["data"]["rev"], "100.000000");
        assert!(json["data"]["items"].as_object().unwrap().is_empty());
    }
}
