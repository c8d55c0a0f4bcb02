//! Fan-out bus messages and the subscriber half.

use crate::error::{CacheError, CacheResult};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tandem_core::model::{ListCacheEntry, Membership, TodoItem};
use tandem_core::rev::Rev;
use uuid::Uuid;

/// A message on the fan-out channel.
///
/// Item messages are published by the mutation scripts in the same atomic
/// step as the cache write; list messages are published by the coordinator
/// after its synchronous durable write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMessage {
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
    /// Carries the new member and a full snapshot so the recipient's node
    /// can seed its tiers without a read-through.
    ListShared {
        list_id: Uuid,
        member: Membership,
        snapshot: ListCacheEntry,
    },
    ListDeleted {
        list_id: Uuid,
    },
}

impl UpdateMessage {
    pub fn list_id(&self) -> Uuid {
        match self {
            Self::ItemAdded { list_id, .. }
            | Self::ItemUpdated { list_id, .. }
            | Self::ItemDeleted { list_id, .. }
            | Self::ListShared { list_id, .. }
            | Self::ListDeleted { list_id } => *list_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ItemAdded { .. } => "item_added",
            Self::ItemUpdated { .. } => "item_updated",
            Self::ItemDeleted { .. } => "item_deleted",
            Self::ListShared { .. } => "list_shared",
            Self::ListDeleted { .. } => "list_deleted",
        }
    }
}

/// The subscriber half of the fan-out bus: one dedicated connection,
/// subscribed to the update channel.
pub struct UpdateSubscriber {
    pubsub: redis::aio::PubSub,
}

impl UpdateSubscriber {
    pub(crate) async fn new(client: &redis::Client, channel: &str) -> CacheResult<Self> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(Self { pubsub })
    }

    /// Next message from the bus. `None` means the connection dropped and
    /// the caller should re-subscribe. A decode failure is returned as an
    /// error but leaves the stream usable.
    pub async fn next_message(&mut self) -> Option<CacheResult<UpdateMessage>> {
        let msg = self.pubsub.on_message().next().await?;
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => return Some(Err(CacheError::Redis(e))),
        };
        Some(
            serde_json::from_str(&payload)
                .map_err(|e| CacheError::Decode(format!("bad update message: {e}"))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn decodes_script_emitted_item_deleted() {
        // Shape produced by the delete_item Lua script.
        let list_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"item_deleted","list_id":"{list_id}","item_id":"{item_id}","rev":"1730484792.000007"}}"#
        );
        let message: UpdateMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(message.kind(), "item_deleted");
        assert_eq!(message.list_id(), list_id);
    }

    #[test]
    fn list_shared_round_trips_with_snapshot() {
        let list_id = Uuid::new_v4();
        let member = Membership {
            list_id,
            user_id: Uuid::new_v4(),
            role: "editor".parse().unwrap(),
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        };
        let message = UpdateMessage::ListShared {
            list_id,
            member,
            snapshot: ListCacheEntry {
                list_id,
                list_name: "Groceries".to_string(),
                owner_id: Uuid::new_v4(),
                items: HashMap::new(),
                rev: "5.000000".parse().unwrap(),
                updated_at: 5,
            },
        };
        let json = serde_json::to_string(&message).unwrap();
        let back: UpdateMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
