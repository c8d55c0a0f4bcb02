//! Fan-out bus listener.
//!
//! One long-running subscriber per process. This is the only path by which
//! a node learns of another node's writes, and it is also the delivery
//! path for the node's own writes: local mutations never emit directly to
//! clients, so the origin and remote paths stay identical.

use crate::metrics;
use crate::state::{AppState, ListCache};
use std::sync::Arc;
use tandem_cache::UpdateMessage;
use tandem_core::event::OutboundEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

const RESUBSCRIBE_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

/// Spawn the listener task. It re-subscribes with backoff if the bus
/// connection drops, and stops when `shutdown` flips to true.
pub fn spawn(state: AppState, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(channel = state.shared_store.channel(), "Fan-out listener starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let mut subscriber = match state.shared_store.subscribe().await {
                Ok(subscriber) => {
                    state.readiness.set_listener(true);
                    subscriber
                }
                Err(e) => {
                    state.readiness.set_listener(false);
                    tracing::warn!(error = %e, "Fan-out subscribe failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(RESUBSCRIBE_BACKOFF) => continue,
                        _ = shutdown.changed() => break,
                    }
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            state.readiness.set_listener(false);
                            tracing::info!("Fan-out listener stopped");
                            return;
                        }
                    }
                    maybe = subscriber.next_message() => match maybe {
                        None => {
                            state.readiness.set_listener(false);
                            tracing::warn!("Fan-out connection lost, re-subscribing");
                            break;
                        }
                        Some(Err(e)) => {
                            // One bad message never takes the loop down.
                            metrics::PUBSUB_FAILURES.inc();
                            tracing::error!(error = %e, "Failed to decode fan-out message");
                        }
                        Some(Ok(message)) => handle_message(&state, message).await,
                    }
                }
            }
        }

        state.readiness.set_listener(false);
        tracing::info!("Fan-out listener stopped");
    })
}

/// Apply one bus message to local state and deliver to local subscribers.
async fn handle_message(state: &AppState, message: UpdateMessage) {
    metrics::PUBSUB_MESSAGES
        .with_label_values(&[message.kind()])
        .inc();
    let list_id = message.list_id();
    tracing::debug!(kind = message.kind(), %list_id, "Fan-out message received");

    match message {
        UpdateMessage::ItemAdded { list_id, item, rev } => {
            if !prepare_entry(state, list_id).await {
                return;
            }
            state
                .cache
                .with_entry(list_id, |entry| entry.apply_item(item.clone(), rev));
            deliver(state, list_id, OutboundEvent::ItemAdded { list_id, item, rev });
        }
        UpdateMessage::ItemUpdated { list_id, item, rev } => {
            if !prepare_entry(state, list_id).await {
                return;
            }
            state
                .cache
                .with_entry(list_id, |entry| entry.apply_item(item.clone(), rev));
            deliver(state, list_id, OutboundEvent::ItemUpdated { list_id, item, rev });
        }
        UpdateMessage::ItemDeleted {
            list_id,
            item_id,
            rev,
        } => {
            if !prepare_entry(state, list_id).await {
                return;
            }
            state
                .cache
                .with_entry(list_id, |entry| entry.apply_tombstone(item_id, rev));
            deliver(
                state,
                list_id,
                OutboundEvent::ItemDeleted {
                    list_id,
                    item_id,
                    rev,
                },
            );
        }
        UpdateMessage::ListShared {
            list_id,
            member,
            snapshot,
        } => {
            let recipients = state.registry.sessions_for_user(member.user_id);
            if recipients.is_empty() {
                return;
            }
            // The carried snapshot seeds this node's L1 so the expected
            // join_list right after needs no read-through.
            seed_newer(&state.cache, snapshot);
            let event = OutboundEvent::ListSharedWithYou {
                list_id,
                message: "A list was shared with you.".to_string(),
            };
            for tx in recipients {
                let _ = tx.send(event.clone());
            }
        }
        UpdateMessage::ListDeleted { list_id } => {
            state.cache.drop_list(list_id);
            deliver(state, list_id, OutboundEvent::ListDeleted { list_id });
        }
    }
}

/// Make sure L1 can absorb an item mutation. When the list is not cached
/// but local subscribers exist (an eviction or flush raced the stream),
/// the entry is re-seeded from the shared tier, which already reflects
/// the mutation. Without subscribers the message is ignored.
async fn prepare_entry(state: &AppState, list_id: Uuid) -> bool {
    if state.cache.contains(list_id) {
        return true;
    }
    if !state.registry.has_room(list_id) {
        return false;
    }
    match state.shared_store.load_list(list_id).await {
        Ok(Some(entry)) => {
            state.cache.put(entry);
            true
        }
        Ok(None) => {
            tracing::warn!(%list_id, "Subscribed list missing from shared store");
            true
        }
        Err(e) => {
            metrics::PUBSUB_FAILURES.inc();
            tracing::error!(%list_id, error = %e, "Failed to re-seed list from shared store");
            true
        }
    }
}

/// Replace the cached entry unless the cached one is already newer.
fn seed_newer(cache: &Arc<ListCache>, snapshot: tandem_core::model::ListCacheEntry) {
    match cache.get(snapshot.list_id) {
        Some(existing) if existing.rev >= snapshot.rev => {}
        _ => cache.put(snapshot),
    }
}

fn deliver(state: &AppState, list_id: Uuid, event: OutboundEvent) {
    let sessions = state.registry.sessions_for_list(list_id);
    if sessions.is_empty() {
        return;
    }
    tracing::debug!(event = event.name(), %list_id, sessions = sessions.len(), "Delivering fan-out event");
    for tx in sessions {
        let _ = tx.send(event.clone());
    }
}
