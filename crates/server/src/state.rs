//! Per-process state: the L1 cache, the connection registry, and the
//! application state shared across handlers.

use crate::auth::AuthVerifier;
use crate::coordinator::Coordinator;
use crate::permission::PermissionService;
use crate::writer::WriterHandle;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tandem_cache::SharedStore;
use tandem_core::config::AppConfig;
use tandem_core::event::OutboundEvent;
use tandem_core::model::ListCacheEntry;
use tandem_repository::ListStore;
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-process (L1) cache of list state.
///
/// A plain map under one mutex: updates are coarse-grained and each
/// critical section is O(one list entry). Eviction never deletes data,
/// the shared and durable tiers stay authoritative.
#[derive(Default)]
pub struct ListCache {
    inner: Mutex<HashMap<Uuid, ListCacheEntry>>,
}

/// One row of the `/cache` summary.
#[derive(Debug, Serialize)]
pub struct CacheSummaryEntry {
    pub list_id: Uuid,
    pub list_name: String,
    pub items: usize,
    pub rev: String,
}

impl ListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, list_id: Uuid) -> Option<ListCacheEntry> {
        self.inner.lock().unwrap().get(&list_id).cloned()
    }

    pub fn contains(&self, list_id: Uuid) -> bool {
        self.inner.lock().unwrap().contains_key(&list_id)
    }

    pub fn put(&self, entry: ListCacheEntry) {
        let mut map = self.inner.lock().unwrap();
        map.insert(entry.list_id, entry);
        crate::metrics::CACHED_LISTS.set(map.len() as i64);
    }

    /// Mutate an entry in place. Returns false when the list is not cached.
    pub fn with_entry(&self, list_id: Uuid, f: impl FnOnce(&mut ListCacheEntry)) -> bool {
        let mut map = self.inner.lock().unwrap();
        match map.get_mut(&list_id) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }

    pub fn drop_list(&self, list_id: Uuid) {
        let mut map = self.inner.lock().unwrap();
        map.remove(&list_id);
        crate::metrics::CACHED_LISTS.set(map.len() as i64);
    }

    /// Drop everything, returning the ids that were cached.
    pub fn flush_all(&self) -> Vec<Uuid> {
        let mut map = self.inner.lock().unwrap();
        let ids = map.keys().copied().collect();
        map.clear();
        crate::metrics::CACHED_LISTS.set(0);
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> Vec<CacheSummaryEntry> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .map(|entry| CacheSummaryEntry {
                list_id: entry.list_id,
                list_name: entry.list_name.clone(),
                items: entry.live_len(),
                rev: entry.rev.to_string(),
            })
            .collect()
    }
}

/// Connection statistics for the operational surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
}

struct SessionHandle {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, SessionHandle>,
    by_user: HashMap<Uuid, HashSet<Uuid>>,
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

/// Registry of live socket sessions and their list subscriptions.
///
/// Sessions are keyed by a server-generated session id; each session is
/// bound to exactly one user identity for its lifetime.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        tx: mpsc::UnboundedSender<OutboundEvent>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sessions
            .insert(session_id, SessionHandle { user_id, tx });
        inner.by_user.entry(user_id).or_default().insert(session_id);
    }

    /// Drop a session and all of its subscriptions.
    pub fn remove_connection(&self, session_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.sessions.remove(&session_id) {
            if let Some(sessions) = inner.by_user.get_mut(&handle.user_id) {
                sessions.remove(&session_id);
                if sessions.is_empty() {
                    inner.by_user.remove(&handle.user_id);
                }
            }
        }
        inner.rooms.retain(|_, members| {
            members.remove(&session_id);
            !members.is_empty()
        });
    }

    /// Bound user identity of a live session.
    pub fn user_of(&self, session_id: Uuid) -> Option<Uuid> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(&session_id)
            .map(|handle| handle.user_id)
    }

    /// Subscribe a session to a list. Returns false for unknown sessions.
    pub fn subscribe(&self, session_id: Uuid, list_id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.sessions.contains_key(&session_id) {
            return false;
        }
        inner.rooms.entry(list_id).or_default().insert(session_id);
        true
    }

    pub fn unsubscribe_all(&self, session_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.rooms.retain(|_, members| {
            members.remove(&session_id);
            !members.is_empty()
        });
    }

    /// Whether any local session is subscribed to the list.
    pub fn has_room(&self, list_id: Uuid) -> bool {
        self.inner.lock().unwrap().rooms.contains_key(&list_id)
    }

    /// Outbound senders of every session subscribed to the list.
    pub fn sessions_for_list(&self, list_id: Uuid) -> Vec<mpsc::UnboundedSender<OutboundEvent>> {
        let inner = self.inner.lock().unwrap();
        inner
            .rooms
            .get(&list_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|sid| inner.sessions.get(sid))
                    .map(|handle| handle.tx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Outbound senders of every session bound to the user.
    pub fn sessions_for_user(&self, user_id: Uuid) -> Vec<mpsc::UnboundedSender<OutboundEvent>> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_user
            .get(&user_id)
            .map(|sessions| {
                sessions
                    .iter()
                    .filter_map(|sid| inner.sessions.get(sid))
                    .map(|handle| handle.tx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Queue an event to one session. A send failure means the session is
    /// tearing down and is ignored.
    pub fn send_to(&self, session_id: Uuid, event: OutboundEvent) {
        let inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.sessions.get(&session_id) {
            let _ = handle.tx.send(event);
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        let inner = self.inner.lock().unwrap();
        ConnectionStats {
            total_connections: inner.sessions.len(),
            unique_users: inner.by_user.len(),
        }
    }

    /// Subscriber counts per list, for `/rooms`.
    pub fn rooms_summary(&self) -> HashMap<Uuid, usize> {
        self.inner
            .lock()
            .unwrap()
            .rooms
            .iter()
            .map(|(list_id, members)| (*list_id, members.len()))
            .collect()
    }
}

/// Startup flags gating `/ready`.
#[derive(Clone, Default)]
pub struct Readiness {
    listener: Arc<AtomicBool>,
    writer: Arc<AtomicBool>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&self, up: bool) {
        self.listener.store(up, Ordering::Relaxed);
    }

    pub fn set_writer(&self, up: bool) {
        self.writer.store(up, Ordering::Relaxed);
    }

    pub fn listener_up(&self) -> bool {
        self.listener.load(Ordering::Relaxed)
    }

    pub fn writer_up(&self) -> bool {
        self.writer.load(Ordering::Relaxed)
    }

    pub fn ready(&self) -> bool {
        self.listener_up() && self.writer_up()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Arc<dyn ListStore>,
    pub shared_store: SharedStore,
    pub cache: Arc<ListCache>,
    pub registry: Arc<ConnectionRegistry>,
    pub coordinator: Arc<Coordinator>,
    pub permissions: Arc<PermissionService>,
    pub auth: Arc<AuthVerifier>,
    pub writer: WriterHandle,
    pub readiness: Readiness,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn ListStore>,
        shared_store: SharedStore,
        writer: WriterHandle,
        readiness: Readiness,
    ) -> Self {
        let cache = Arc::new(ListCache::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let coordinator = Arc::new(Coordinator::new(
            repository.clone(),
            shared_store.clone(),
            cache.clone(),
            writer.clone(),
        ));
        let permissions = Arc::new(PermissionService::new(repository.clone()));
        let auth = Arc::new(AuthVerifier::new(&config.auth.secret));
        Self {
            config: Arc::new(config),
            repository,
            shared_store,
            cache,
            registry,
            coordinator,
            permissions,
            auth,
            writer,
            readiness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use tandem_core::rev::Rev;

    fn entry(list_id: Uuid) -> ListCacheEntry {
        ListCacheEntry {
            list_id,
            list_name: "Groceries".to_string(),
            owner_id: Uuid::new_v4(),
            items: StdHashMap::new(),
            rev: Rev::ZERO,
            updated_at: 0,
        }
    }

    #[test]
    fn cache_put_get_flush() {
        let cache = ListCache::new();
        let list_id = Uuid::new_v4();
        cache.put(entry(list_id));
        assert!(cache.contains(list_id));
        assert_eq!(cache.len(), 1);

        let flushed = cache.flush_all();
        assert_eq!(flushed, vec![list_id]);
        assert!(cache.is_empty());
    }

    #[test]
    fn with_entry_reports_missing_lists() {
        let cache = ListCache::new();
        assert!(!cache.with_entry(Uuid::new_v4(), |_| {}));
    }

    #[test]
    fn registry_tracks_rooms_and_users() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Uuid::new_v4();
        let user = Uuid::new_v4();
        let list = Uuid::new_v4();

        registry.add_connection(session, user, tx);
        assert!(registry.subscribe(session, list));
        assert!(registry.has_room(list));
        assert_eq!(registry.sessions_for_list(list).len(), 1);
        assert_eq!(registry.sessions_for_user(user).len(), 1);
        assert_eq!(registry.user_of(session), Some(user));

        registry.remove_connection(session);
        assert!(!registry.has_room(list));
        assert!(registry.sessions_for_user(user).is_empty());
        assert_eq!(registry.stats().total_connections, 0);
    }

    #[test]
    fn subscribe_requires_live_session() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.subscribe(Uuid::new_v4(), Uuid::new_v4()));
    }

    #[test]
    fn two_sessions_one_user_count_once() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        registry.add_connection(Uuid::new_v4(), user, tx1);
        registry.add_connection(Uuid::new_v4(), user, tx2);

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.unique_users, 1);
        assert_eq!(registry.sessions_for_user(user).len(), 2);
    }

    #[test]
    fn readiness_requires_both_tasks() {
        let readiness = Readiness::new();
        assert!(!readiness.ready());
        readiness.set_writer(true);
        assert!(!readiness.ready());
        readiness.set_listener(true);
        assert!(readiness.ready());
    }
}
