//! Todo lists, items, membership, and the cached list state.

use crate::rev::Rev;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Completion status of a todo item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// A member's role on a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Editor,
    Viewer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A todo list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A todo item. This is the wire shape carried in snapshots, fan-out
/// messages, and the shared-store items map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: Uuid,
    pub list_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub done: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A user's membership on a list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A field-level patch for `update_item`.
///
/// `None` means "field not supplied, keep the current value". The
/// `done`/`status` coupling is applied by [`ItemPatch::normalized`], which
/// the coordinator invokes before merging; handlers must not duplicate it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ItemStatus>,
    pub done: Option<bool>,
    pub due_date: Option<OffsetDateTime>,
    pub media_url: Option<String>,
}

impl ItemPatch {
    /// Apply the `done`/`status` coupling against the current item:
    /// - `status = completed` forces `done = true` (and any other status
    ///   forces `done = false`);
    /// - `done = true` without a status forces `status = completed`;
    /// - `done = false` while the item is completed demotes it to
    ///   `in_progress`.
    pub fn normalized(mut self, current: &TodoItem) -> Self {
        match (self.status, self.done) {
            (Some(status), _) => {
                self.done = Some(status == ItemStatus::Completed);
            }
            (None, Some(true)) => {
                self.status = Some(ItemStatus::Completed);
            }
            (None, Some(false)) => {
                if current.status == ItemStatus::Completed {
                    self.status = Some(ItemStatus::InProgress);
                }
            }
            (None, None) => {}
        }
        self
    }

    /// Merge the patch over `item`, stamping `updated_at`.
    pub fn apply_to(&self, item: &mut TodoItem, now: OffsetDateTime) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(description) = &self.description {
            item.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(done) = self.done {
            item.done = done;
        }
        if let Some(due_date) = self.due_date {
            item.due_date = Some(due_date);
        }
        if let Some(media_url) = &self.media_url {
            item.media_url = Some(media_url.clone());
        }
        item.updated_at = now;
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Cached state for one list, as held in L1 and (encoded) in L2.
///
/// Deleted items stay in `items` as `None` tombstones so stale replicas
/// can converge; they are dropped from client-facing snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListCacheEntry {
    pub list_id: Uuid,
    pub list_name: String,
    pub owner_id: Uuid,
    pub items: HashMap<Uuid, Option<TodoItem>>,
    pub rev: Rev,
    /// Shared-store clock seconds of the last write.
    pub updated_at: i64,
}

impl ListCacheEntry {
    /// Insert or replace an item, advancing `rev` if the mutation carries
    /// a newer revision. The mutation itself is applied unconditionally:
    /// per-list pub/sub delivery order matches commit order, so replaying
    /// in that order converges on last-writer-wins state.
    pub fn apply_item(&mut self, item: TodoItem, rev: Rev) {
        self.items.insert(item.id, Some(item));
        self.advance_rev(rev);
    }

    /// Replace an item with a tombstone.
    pub fn apply_tombstone(&mut self, item_id: Uuid, rev: Rev) {
        self.items.insert(item_id, None);
        self.advance_rev(rev);
    }

    fn advance_rev(&mut self, rev: Rev) {
        if rev > self.rev {
            self.rev = rev;
            self.updated_at = rev.secs();
        }
    }

    /// The item under `item_id`, if present and not tombstoned.
    pub fn live_item(&self, item_id: Uuid) -> Option<&TodoItem> {
        self.items.get(&item_id).and_then(|slot| slot.as_ref())
    }

    /// All non-tombstone items, keyed by id.
    pub fn live_items(&self) -> HashMap<Uuid, TodoItem> {
        self.items
            .iter()
            .filter_map(|(id, slot)| slot.as_ref().map(|item| (*id, item.clone())))
            .collect()
    }

    /// Number of non-tombstone items.
    pub fn live_len(&self) -> usize {
        self.items.values().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: ItemStatus, done: bool) -> TodoItem {
        let now = OffsetDateTime::UNIX_EPOCH;
        TodoItem {
            id: Uuid::new_v4(),
            list_id: Uuid::new_v4(),
            name: "Milk".to_string(),
            description: None,
            status,
            done,
            due_date: None,
            media_url: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn coupling_status_completed_forces_done() {
        let current = item(ItemStatus::InProgress, false);
        let patch = ItemPatch {
            status: Some(ItemStatus::Completed),
            ..Default::default()
        }
        .normalized(&current);
        assert_eq!(patch.done, Some(true));
    }

    #[test]
    fn coupling_status_regression_clears_done() {
        let current = item(ItemStatus::Completed, true);
        let patch = ItemPatch {
            status: Some(ItemStatus::InProgress),
            ..Default::default()
        }
        .normalized(&current);
        assert_eq!(patch.done, Some(false));
    }

    #[test]
    fn coupling_done_true_forces_completed() {
        let current = item(ItemStatus::NotStarted, false);
        let patch = ItemPatch {
            done: Some(true),
            ..Default::default()
        }
        .normalized(&current);
        assert_eq!(patch.status, Some(ItemStatus::Completed));
    }

    #[test]
    fn coupling_done_false_demotes_completed() {
        let current = item(ItemStatus::Completed, true);
        let patch = ItemPatch {
            done: Some(false),
            ..Default::default()
        }
        .normalized(&current);
        assert_eq!(patch.status, Some(ItemStatus::InProgress));
    }

    #[test]
    fn coupling_done_false_keeps_non_completed_status() {
        let current = item(ItemStatus::InProgress, false);
        let patch = ItemPatch {
            done: Some(false),
            ..Default::default()
        }
        .normalized(&current);
        assert_eq!(patch.status, None);
    }

    #[test]
    fn patch_preserves_unset_fields() {
        let mut target = item(ItemStatus::NotStarted, false);
        target.description = Some("2% from the corner store".to_string());
        let patch = ItemPatch {
            name: Some("Oat milk".to_string()),
            ..Default::default()
        };
        let now = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(5);
        patch.apply_to(&mut target, now);
        assert_eq!(target.name, "Oat milk");
        assert_eq!(
            target.description.as_deref(),
            Some("2% from the corner store")
        );
        assert_eq!(target.updated_at, now);
    }

    #[test]
    fn cache_entry_rev_never_decreases() {
        let first = item(ItemStatus::NotStarted, false);
        let mut entry = ListCacheEntry {
            list_id: first.list_id,
            list_name: "Groceries".to_string(),
            owner_id: Uuid::new_v4(),
            items: HashMap::new(),
            rev: "100.000000".parse().unwrap(),
            updated_at: 100,
        };
        entry.apply_item(first.clone(), "101.000000".parse().unwrap());
        assert_eq!(entry.rev, "101.000000".parse().unwrap());

        // A late-arriving echo of an older write must not roll `rev` back.
        entry.apply_tombstone(first.id, "99.000000".parse().unwrap());
        assert_eq!(entry.rev, "101.000000".parse().unwrap());
        assert_eq!(entry.live_len(), 0);
    }

    #[test]
    fn snapshot_excludes_tombstones() {
        let kept = item(ItemStatus::NotStarted, false);
        let dropped = item(ItemStatus::NotStarted, false);
        let mut entry = ListCacheEntry {
            list_id: kept.list_id,
            list_name: "Groceries".to_string(),
            owner_id: Uuid::new_v4(),
            items: HashMap::new(),
            rev: Rev::ZERO,
            updated_at: 0,
        };
        entry.apply_item(kept.clone(), "1.000000".parse().unwrap());
        entry.apply_item(dropped.clone(), "2.000000".parse().unwrap());
        entry.apply_tombstone(dropped.id, "3.000000".parse().unwrap());

        let live = entry.live_items();
        assert_eq!(live.len(), 1);
        assert!(live.contains_key(&kept.id));
        assert!(entry.live_item(dropped.id).is_none());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ItemStatus::NotStarted,
            ItemStatus::InProgress,
            ItemStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
        assert!("done".parse::<ItemStatus>().is_err());
    }
}
