//! Collab node for the Tandem real-time todo service.
//!
//! This crate is the per-process half of the system:
//! - WebSocket sessions and per-event dispatch
//! - The coordinator across the L1/L2/L3 tiers
//! - The in-process cache and connection registry
//! - The fan-out bus listener
//! - The write-behind persistence worker
//! - Permission and auth layers
//! - The operational HTTP surface

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod metrics;
pub mod permission;
pub mod routes;
pub mod state;
pub mod writer;

pub use error::{ApiError, EventError};
pub use routes::create_router;
pub use state::AppState;
