//! Shared application state injected into every Axum handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::config::Config;
use crate::entities::AnyStore;
use crate::services::{AuthClient, TherapyService};

/// Live WebSocket connections: at most one per chat session, counted
/// against a global cap.
pub struct ConnectionRegistry {
    max: usize,
    active: AtomicUsize,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<String, (u64, Arc<Notify>)>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionRegistry({}/{} active)", self.active(), self.max)
    }
}

/// A reserved place under the connection cap. Dropping it gives the place
/// back.
pub struct Slot {
    registry: Arc<ConnectionRegistry>,
}

/// A registered connection. `replaced` fires when a newer connection for
/// the same session takes over; dropping it unregisters.
pub struct Connection {
    slot: Slot,
    session_id: String,
    id: u64,
    pub replaced: Arc<Notify>,
}

impl ConnectionRegistry {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            active: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Claims a place under the cap, or `None` when every place is taken.
    pub fn try_reserve(self: &Arc<Self>) -> Option<Slot> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max).then_some(n + 1))
            .ok()?;
        Some(Slot { registry: self.clone() })
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, (u64, Arc<Notify>)>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unregister(&self, session_id: &str, id: u64) {
        let mut map = self.sessions();
        // A newer connection may already own the session.
        if map.get(session_id).is_some_and(|(current, _)| *current == id) {
            map.remove(session_id);
        }
    }

    #[cfg(test)]
    pub fn is_registered(&self, session_id: &str) -> bool {
        self.sessions().contains_key(session_id)
    }
}

impl Slot {
    /// Registers a connection for `session_id` in this slot, signalling
    /// the one it replaces.
    pub fn register(self, session_id: &str) -> Connection {
        let registry = &self.registry;
        let id = registry.next_id.fetch_add(1, Ordering::Relaxed);
        let replaced = Arc::new(Notify::new());
        if let Some((old_id, old)) = registry
            .sessions()
            .insert(session_id.to_string(), (id, replaced.clone()))
        {
            tracing::info!(session_id = %session_id, old_id, "replacing websocket connection");
            old.notify_one();
        }
        Connection {
            slot: self,
            session_id: session_id.to_string(),
            id,
            replaced,
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.registry.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.slot.registry.unregister(&self.session_id, self.id);
    }
}

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    pub store: AnyStore,
    /// Analysis, retrieval and generation for chat messages.
    pub therapy: Arc<TherapyService>,
    pub auth: AuthClient,
    pub connections: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(config: Config, therapy: TherapyService, auth: AuthClient) -> Self {
        let connections = Arc::new(ConnectionRegistry::new(config.max_ws_connections));
        Self {
            store: therapy.store().clone(),
            config: Arc::new(config),
            therapy: Arc::new(therapy),
            auth,
            connections,
        }
    }
}
