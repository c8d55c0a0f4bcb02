//! Core domain types and shared logic for the Tandem collaboration service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Todo lists, items, and list membership
//! - The revision number drawn from the shared store's clock
//! - The inbound/outbound wire-event unions for the message socket
//! - Payload validation schemas
//! - Application configuration

pub mod config;
pub mod event;
pub mod model;
pub mod rev;
pub mod validate;

pub use config::AppConfig;
pub use event::{InboundEvent, ListSnapshot, OutboundEvent};
pub use model::{
    ItemPatch, ItemStatus, ListCacheEntry, MemberRole, Membership, TodoItem, TodoList,
};
pub use rev::Rev;
pub use validate::FieldError;

/// Shared-store key prefix for per-list state hashes.
pub const LIST_STATE_KEY_PREFIX: &str = "todo:state:";

/// Default pub/sub channel for cross-node fan-out.
pub const DEFAULT_PUBSUB_CHANNEL: &str = "todo:updates";

/// Build the shared-store key for a list's cached state.
pub fn list_state_key(list_id: uuid::Uuid) -> String {
    format!("{LIST_STATE_KEY_PREFIX}{list_id}")
}
