//! Live-connection presence registry.
//!
//! Tracks at most one connection per facilitator identity plus a single
//! backend slot. Registration is last-writer-wins: a newer authenticated
//! connection for the same identity replaces the entry, and the superseded
//! connection is simply orphaned, not closed. Removal on disconnect only
//! happens when the stored connection id still equals the disconnecting one,
//! so a stale disconnect can never evict a newer registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use super::messages::ServerMessage;

/// Sender half of a live connection's outbound channel.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// Monotonically increasing connection generation. Later connections always
/// compare greater, which makes supersede-vs-stale decisions explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

struct PresenceEntry {
    conn: ConnectionId,
    sender: MessageSender,
}

#[derive(Default)]
struct RegistryInner {
    facilitators: HashMap<i64, PresenceEntry>,
    backend: Option<PresenceEntry>,
}

/// Shared presence state, cloned into every handler.
///
/// Every check-then-mutate sequence holds one lock guard for its whole
/// duration; concurrent connect/disconnect traffic on independent sessions
/// resolves in favor of the newer registration.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next connection generation. Called once per accepted
    /// transport connection, before any registration.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Register `conn` as the live connection for `facilitator_id`,
    /// superseding any older entry. A delayed registration attempt from an
    /// older connection never replaces a newer one.
    pub async fn register_facilitator(
        &self,
        facilitator_id: i64,
        conn: ConnectionId,
        sender: MessageSender,
    ) {
        let mut guard = self.inner.write().await;
        match guard.facilitators.get(&facilitator_id) {
            Some(existing) if existing.conn > conn => {
                tracing::debug!(
                    facilitator_id,
                    stale = conn.as_u64(),
                    current = existing.conn.as_u64(),
                    "ignoring registration from superseded connection"
                );
            }
            _ => {
                guard
                    .facilitators
                    .insert(facilitator_id, PresenceEntry { conn, sender });
                tracing::info!(facilitator_id, conn = conn.as_u64(), "facilitator online");
            }
        }
    }

    /// Place `conn` in the backend slot, superseding any prior backend
    /// connection. The stale connection keeps its transport open but loses
    /// the right to submit events.
    pub async fn register_backend(&self, conn: ConnectionId, sender: MessageSender) {
        let mut guard = self.inner.write().await;
        match &guard.backend {
            Some(existing) if existing.conn > conn => {
                tracing::debug!(
                    stale = conn.as_u64(),
                    current = existing.conn.as_u64(),
                    "ignoring backend registration from superseded connection"
                );
            }
            _ => {
                guard.backend = Some(PresenceEntry { conn, sender });
                tracing::info!(conn = conn.as_u64(), "backend service connected");
            }
        }
    }

    /// Remove whatever `conn` is registered as. Exact-match only: a
    /// disconnect from a superseded connection removes nothing.
    pub async fn unregister(&self, conn: ConnectionId) {
        let mut guard = self.inner.write().await;

        let facilitator = guard
            .facilitators
            .iter()
            .find(|(_, entry)| entry.conn == conn)
            .map(|(id, _)| *id);
        if let Some(facilitator_id) = facilitator {
            guard.facilitators.remove(&facilitator_id);
            tracing::info!(facilitator_id, conn = conn.as_u64(), "facilitator offline");
        }

        if guard.backend.as_ref().is_some_and(|e| e.conn == conn) {
            guard.backend = None;
            tracing::info!(conn = conn.as_u64(), "backend service disconnected");
        }
    }

    pub async fn is_present(&self, facilitator_id: i64) -> bool {
        self.inner
            .read()
            .await
            .facilitators
            .contains_key(&facilitator_id)
    }

    /// True when `conn` is exactly the connection currently in the backend
    /// slot. A superseded backend connection fails this check.
    pub async fn is_backend(&self, conn: ConnectionId) -> bool {
        self.inner
            .read()
            .await
            .backend
            .as_ref()
            .is_some_and(|e| e.conn == conn)
    }

    /// True when `conn` is the live registered connection for the claimed
    /// facilitator identity. Ownership follows the registry, not the claim.
    pub async fn owns_facilitator(&self, conn: ConnectionId, facilitator_id: i64) -> bool {
        self.inner
            .read()
            .await
            .facilitators
            .get(&facilitator_id)
            .is_some_and(|e| e.conn == conn)
    }

    /// Push a message to the facilitator's live connection if one exists.
    /// The presence check and the send happen under the same guard, so the
    /// caller's present/absent decision cannot race a disconnect. Returns
    /// whether a connection was present; the send itself is fire-and-forget.
    pub async fn send_to_facilitator(&self, facilitator_id: i64, message: ServerMessage) -> bool {
        let guard = self.inner.read().await;
        match guard.facilitators.get(&facilitator_id) {
            Some(entry) => {
                // A dropped push is an accepted risk of the fast path.
                let _ = entry.sender.send(message);
                true
            }
            None => false,
        }
    }

    pub async fn online_facilitator_count(&self) -> usize {
        self.inner.read().await.facilitators.len()
    }

    pub async fn backend_connected(&self) -> bool {
        self.inner.read().await.backend.is_some()
    }
}
