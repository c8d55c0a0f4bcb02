//! Structural validation of inbound event payloads.
//!
//! Each schema narrows the loose wire payload into typed fields, collecting
//! every field-level problem instead of stopping at the first. Unknown
//! fields were already ignored at decode time.

use crate::event::{AddItemPayload, CreateListPayload, ShareListPayload, UpdateItemPayload};
use crate::model::{ItemPatch, ItemStatus, MemberRole};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Maximum item name length on `add_item`.
pub const ADD_NAME_MAX: usize = 255;
/// Maximum item name length on `update_item`.
pub const UPDATE_NAME_MAX: usize = 500;
/// Maximum description length.
pub const DESCRIPTION_MAX: usize = 2000;
/// Maximum list name length.
pub const LIST_NAME_MAX: usize = 255;

/// Name given to lists created without an explicit one.
pub const DEFAULT_LIST_NAME: &str = "Untitled List";

/// One field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validated fields for a new item.
#[derive(Clone, Debug, PartialEq)]
pub struct NewItemFields {
    pub name: String,
    pub description: Option<String>,
    pub status: ItemStatus,
    pub done: bool,
    pub due_date: Option<OffsetDateTime>,
    pub media_url: Option<String>,
}

struct Errors(Vec<FieldError>);

impl Errors {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    fn finish<T>(self, value: T) -> Result<T, Vec<FieldError>> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self.0)
        }
    }
}

fn parse_status(raw: &Option<String>, errors: &mut Errors) -> Option<ItemStatus> {
    raw.as_deref().and_then(|s| match s.parse() {
        Ok(status) => Some(status),
        Err(message) => {
            errors.push("status", message);
            None
        }
    })
}

fn parse_due_date(raw: &Option<String>, errors: &mut Errors) -> Option<OffsetDateTime> {
    raw.as_deref().and_then(|s| {
        match OffsetDateTime::parse(s, &Rfc3339) {
            Ok(ts) => Some(ts),
            Err(_) => {
                errors.push("due_date", "expected an RFC 3339 timestamp");
                None
            }
        }
    })
}

fn check_description(raw: &Option<String>, errors: &mut Errors) {
    if let Some(description) = raw {
        if description.chars().count() > DESCRIPTION_MAX {
            errors.push(
                "description",
                format!("must be at most {DESCRIPTION_MAX} characters"),
            );
        }
    }
}

/// Schema for `add_item`.
pub fn add_item(payload: &AddItemPayload) -> Result<NewItemFields, Vec<FieldError>> {
    let mut errors = Errors::new();

    let name = payload.name.trim();
    if name.is_empty() {
        errors.push("name", "must not be empty");
    } else if name.chars().count() > ADD_NAME_MAX {
        errors.push("name", format!("must be at most {ADD_NAME_MAX} characters"));
    }
    check_description(&payload.description, &mut errors);

    let status = parse_status(&payload.status, &mut errors);
    let due_date = parse_due_date(&payload.due_date, &mut errors);

    // Initial done/status pair follows the same coupling as updates:
    // an explicit status wins, otherwise done=true means completed.
    let (status, done) = match (status, payload.done) {
        (Some(status), _) => (status, status == ItemStatus::Completed),
        (None, Some(true)) => (ItemStatus::Completed, true),
        (None, _) => (ItemStatus::NotStarted, false),
    };

    errors.finish(NewItemFields {
        name: name.to_string(),
        description: payload.description.clone(),
        status,
        done,
        due_date,
        media_url: payload.media_url.clone(),
    })
}

/// Schema for `update_item`. Produces the un-normalized patch; the
/// coordinator applies the `done`/`status` coupling against the current
/// item snapshot.
pub fn update_item(payload: &UpdateItemPayload) -> Result<ItemPatch, Vec<FieldError>> {
    let mut errors = Errors::new();

    if let Some(name) = &payload.name {
        if name.trim().is_empty() {
            errors.push("name", "must not be empty");
        } else if name.chars().count() > UPDATE_NAME_MAX {
            errors.push(
                "name",
                format!("must be at most {UPDATE_NAME_MAX} characters"),
            );
        }
    }
    check_description(&payload.description, &mut errors);

    let status = parse_status(&payload.status, &mut errors);
    let due_date = parse_due_date(&payload.due_date, &mut errors);

    let patch = ItemPatch {
        name: payload.name.as_deref().map(|s| s.trim().to_string()),
        description: payload.description.clone(),
        status,
        done: payload.done,
        due_date,
        media_url: payload.media_url.clone(),
    };
    if patch.is_empty() {
        errors.push("payload", "no updatable fields supplied");
    }

    errors.finish(patch)
}

/// Schema for `create_list`. An absent name falls back to the default.
pub fn create_list(payload: &CreateListPayload) -> Result<String, Vec<FieldError>> {
    let mut errors = Errors::new();
    let name = match payload.list_name.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_LIST_NAME.to_string(),
        Some(name) => {
            if name.chars().count() > LIST_NAME_MAX {
                errors.push(
                    "list_name",
                    format!("must be at most {LIST_NAME_MAX} characters"),
                );
            }
            name.to_string()
        }
    };
    errors.finish(name)
}

/// Schema for `share_list`.
pub fn share_list(payload: &ShareListPayload) -> Result<MemberRole, Vec<FieldError>> {
    let mut errors = Errors::new();
    let role = match payload.role.parse::<MemberRole>() {
        Ok(role) => role,
        Err(message) => {
            errors.push("role", message);
            MemberRole::Viewer
        }
    };
    errors.finish(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn add_payload(name: &str) -> AddItemPayload {
        AddItemPayload {
            list_id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            status: None,
            done: None,
            due_date: None,
            media_url: None,
        }
    }

    #[test]
    fn add_item_defaults() {
        let fields = add_item(&add_payload("Milk")).unwrap();
        assert_eq!(fields.status, ItemStatus::NotStarted);
        assert!(!fields.done);
        assert!(fields.due_date.is_none());
    }

    #[test]
    fn add_item_rejects_empty_name() {
        let errors = add_item(&add_payload("   ")).unwrap_err();
        assert_eq!(errors[0].field, "name");
    }

    #[test]
    fn add_item_collects_multiple_errors() {
        let mut payload = add_payload("");
        payload.status = Some("finished".to_string());
        payload.due_date = Some("tomorrow".to_string());
        let errors = add_item(&payload).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "status", "due_date"]);
    }

    #[test]
    fn add_item_done_true_implies_completed() {
        let mut payload = add_payload("Milk");
        payload.done = Some(true);
        let fields = add_item(&payload).unwrap();
        assert_eq!(fields.status, ItemStatus::Completed);
        assert!(fields.done);
    }

    #[test]
    fn update_item_requires_some_field() {
        let payload = UpdateItemPayload {
            list_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            name: None,
            description: None,
            status: None,
            done: None,
            due_date: None,
            media_url: None,
            rev: None,
        };
        let errors = update_item(&payload).unwrap_err();
        assert_eq!(errors[0].field, "payload");
    }

    #[test]
    fn update_item_parses_due_date() {
        let payload = UpdateItemPayload {
            list_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            name: None,
            description: None,
            status: None,
            done: None,
            due_date: Some("2026-01-30T00:00:00Z".to_string()),
            media_url: None,
            rev: None,
        };
        let patch = update_item(&payload).unwrap();
        assert!(patch.due_date.is_some());
    }

    #[test]
    fn create_list_falls_back_to_default_name() {
        assert_eq!(
            create_list(&CreateListPayload { list_name: None }).unwrap(),
            DEFAULT_LIST_NAME
        );
        assert_eq!(
            create_list(&CreateListPayload {
                list_name: Some("  ".to_string())
            })
            .unwrap(),
            DEFAULT_LIST_NAME
        );
    }

    #[test]
    fn share_list_rejects_unknown_role() {
        let payload = ShareListPayload {
            list_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "admin".to_string(),
        };
        let errors = share_list(&payload).unwrap_err();
        assert_eq!(errors[0].field, "role");
    }
}
