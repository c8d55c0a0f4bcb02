//! Codec between [`ListCacheEntry`] and the shared store's hash fields.
//!
//! A list's state lives under `todo:state:{list_id}` as a hash with fields
//! `list_name`, `owner_id`, `items` (JSON object, tombstones as `null`),
//! `rev` (decimal string), `updated_at` and `created_at` (clock seconds).

use crate::error::{CacheError, CacheResult};
use std::collections::HashMap;
use tandem_core::model::ListCacheEntry;
use tandem_core::rev::Rev;
use uuid::Uuid;

pub const FIELD_LIST_NAME: &str = "list_name";
pub const FIELD_OWNER_ID: &str = "owner_id";
pub const FIELD_ITEMS: &str = "items";
pub const FIELD_REV: &str = "rev";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_CREATED_AT: &str = "created_at";

/// Decode a `HGETALL` result. An empty map means the key is absent.
pub fn entry_from_fields(
    list_id: Uuid,
    fields: HashMap<String, String>,
) -> CacheResult<Option<ListCacheEntry>> {
    if fields.is_empty() {
        return Ok(None);
    }

    let rev: Rev = match fields.get(FIELD_REV) {
        Some(raw) => raw
            .parse()
            .map_err(|_| CacheError::Decode(format!("list {list_id}: bad rev {raw:?}")))?,
        None => Rev::ZERO,
    };

    let owner_id = match fields.get(FIELD_OWNER_ID) {
        Some(raw) => raw
            .parse()
            .map_err(|_| CacheError::Decode(format!("list {list_id}: bad owner id {raw:?}")))?,
        None => Uuid::nil(),
    };

    let items = match fields.get(FIELD_ITEMS) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| CacheError::Decode(format!("list {list_id}: bad items map: {e}")))?,
        None => HashMap::new(),
    };

    let updated_at = fields
        .get(FIELD_UPDATED_AT)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_else(|| rev.secs());

    Ok(Some(ListCacheEntry {
        list_id,
        list_name: fields.get(FIELD_LIST_NAME).cloned().unwrap_or_default(),
        owner_id,
        items,
        rev,
        updated_at,
    }))
}

/// Encode an entry as `HSET` field/value pairs.
pub fn fields_from_entry(entry: &ListCacheEntry) -> CacheResult<Vec<(&'static str, String)>> {
    let items = serde_json::to_string(&entry.items)
        .map_err(|e| CacheError::Decode(format!("list {}: {e}", entry.list_id)))?;
    Ok(vec![
        (FIELD_LIST_NAME, entry.list_name.clone()),
        (FIELD_OWNER_ID, entry.owner_id.to_string()),
        (FIELD_ITEMS, items),
        (FIELD_REV, entry.rev.to_string()),
        (FIELD_UPDATED_AT, entry.updated_at.to_string()),
        (FIELD_CREATED_AT, entry.updated_at.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::model::{ItemStatus, TodoItem};
    use time::OffsetDateTime;

    fn sample_entry() -> ListCacheEntry {
        let list_id = Uuid::new_v4();
        let now = OffsetDateTime::UNIX_EPOCH;
        let item = TodoItem {
            id: Uuid::new_v4(),
            list_id,
            name: "Milk".to_string(),
            description: None,
            status: ItemStatus::NotStarted,
            done: false,
            due_date: None,
            media_url: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        let tombstoned = Uuid::new_v4();
        let mut entry = ListCacheEntry {
            list_id,
            list_name: "Groceries".to_string(),
            owner_id: Uuid::new_v4(),
            items: HashMap::new(),
            rev: "1730484792.000123".parse().unwrap(),
            updated_at: 1730484792,
        };
        entry.items.insert(item.id, Some(item));
        entry.items.insert(tombstoned, None);
        entry
    }

    #[test]
    fn round_trip_preserves_items_and_tombstones() {
        let entry = sample_entry();
        let fields: HashMap<String, String> = fields_from_entry(&entry)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let decoded = entry_from_fields(entry.list_id, fields).unwrap().unwrap();
        assert_eq!(decoded.rev, entry.rev);
        assert_eq!(decoded.list_name, entry.list_name);
        assert_eq!(decoded.items, entry.items);
        assert_eq!(decoded.live_len(), 1);
    }

    #[test]
    fn absent_key_decodes_to_none() {
        let decoded = entry_from_fields(Uuid::new_v4(), HashMap::new()).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn bad_rev_is_a_decode_error() {
        let mut fields = HashMap::new();
        fields.insert(FIELD_REV.to_string(), "not-a-rev".to_string());
        assert!(entry_from_fields(Uuid::new_v4(), fields).is_err());
    }

    #[test]
    fn missing_optional_fields_get_defaults() {
        let mut fields = HashMap::new();
        fields.insert(FIELD_REV.to_string(), "100.000000".to_string());
        let entry = entry_from_fields(Uuid::new_v4(), fields).unwrap().unwrap();
        assert!(entry.items.is_empty());
        assert_eq!(entry.updated_at, 100);
    }
}
