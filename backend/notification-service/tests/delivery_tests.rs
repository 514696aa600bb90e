//! End-to-end delivery behavior over an in-memory outbox: routing to online
//! and offline facilitators, replay ordering, ownership enforcement and
//! acknowledgment idempotency.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use notification_service::error::{AppError, AppResult};
use notification_service::models::{
    BookingEventPayload, NewNotification, SessionSnapshotPayload, StoredNotification,
    UserSnapshotPayload,
};
use notification_service::services::{
    AckTracker, NotificationRouter, NotificationStore, ReplayDispatcher,
};
use notification_service::websocket::messages::{AckStatus, ServerMessage};
use notification_service::websocket::registry::{ConnectionId, ConnectionRegistry, MessageSender};

/// Outbox double backed by a Vec. Mirrors the SQL contract: append-only
/// rows, newest-first pending scan, row-scoped idempotent mark.
#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<StoredNotification>>,
    next_id: AtomicI64,
    fail_appends: AtomicBool,
}

impl MemoryStore {
    fn failing() -> Self {
        let store = Self::default();
        store.fail_appends.store(true, Ordering::Relaxed);
        store
    }

    async fn row(&self, id: i64) -> Option<StoredNotification> {
        self.rows.lock().await.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn append(&self, notification: NewNotification) -> AppResult<StoredNotification> {
        if self.fail_appends.load(Ordering::Relaxed) {
            return Err(AppError::Persistence("disk unavailable".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = StoredNotification {
            id,
            facilitator_id: notification.facilitator_id,
            booking_id: notification.booking_id,
            user: notification.user,
            session: notification.session,
            created_at: Utc::now(),
            delivered: false,
        };
        self.rows.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn pending_for(&self, facilitator_id: i64) -> AppResult<Vec<StoredNotification>> {
        let mut pending: Vec<StoredNotification> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.facilitator_id == facilitator_id && !r.delivered)
            .cloned()
            .collect();
        pending.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(pending)
    }

    async fn mark_delivered(&self, facilitator_id: i64, notification_id: i64) -> AppResult<bool> {
        let mut rows = self.rows.lock().await;
        match rows
            .iter_mut()
            .find(|r| r.id == notification_id && r.facilitator_id == facilitator_id)
        {
            Some(row) => {
                row.delivered = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn total_count(&self) -> AppResult<i64> {
        Ok(self.rows.lock().await.len() as i64)
    }

    async fn pending_count(&self) -> AppResult<i64> {
        Ok(self.rows.lock().await.iter().filter(|r| !r.delivered).count() as i64)
    }
}

struct Harness {
    registry: ConnectionRegistry,
    store: Arc<MemoryStore>,
    router: NotificationRouter,
    replay: ReplayDispatcher,
    acks: AckTracker,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::default()))
    }

    fn with_store(store: Arc<MemoryStore>) -> Self {
        let registry = ConnectionRegistry::new();
        let outbox: Arc<dyn NotificationStore> = store.clone();
        Self {
            router: NotificationRouter::new(registry.clone(), outbox.clone()),
            replay: ReplayDispatcher::new(registry.clone(), outbox.clone()),
            acks: AckTracker::new(registry.clone(), outbox),
            registry,
            store,
        }
    }

    /// Authenticate a backend connection the way the auth gate would.
    async fn connect_backend(&self) -> ConnectionId {
        let conn = self.registry.next_connection_id();
        let (tx, _rx) = mpsc::unbounded_channel();
        self.registry.register_backend(conn, tx).await;
        conn
    }

    /// Register a facilitator connection and keep its receiving end.
    async fn connect_facilitator(
        &self,
        facilitator_id: i64,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let conn = self.registry.next_connection_id();
        let (tx, rx): (MessageSender, _) = mpsc::unbounded_channel();
        self.registry
            .register_facilitator(facilitator_id, conn, tx)
            .await;
        (conn, rx)
    }
}

fn envelope(booking_id: i64, facilitator_id: i64) -> BookingEventPayload {
    BookingEventPayload {
        booking_id: Some(booking_id),
        user: Some(UserSnapshotPayload {
            id: Some(3),
            email: Some("rae@example.com".into()),
            name: Some("Rae Santos".into()),
        }),
        session: Some(SessionSnapshotPayload {
            id: Some(9),
            title: Some("Intro to Pottery".into()),
            start_time: Some(Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap()),
        }),
        facilitator_id: Some(facilitator_id),
    }
}

fn ack_status(message: &ServerMessage) -> AckStatus {
    match message {
        ServerMessage::NotificationAck { status, .. } => *status,
        other => panic!("expected notification_ack, got {other:?}"),
    }
}

#[tokio::test]
async fn online_facilitator_gets_push_and_no_outbox_row() {
    let h = Harness::new();
    let backend = h.connect_backend().await;
    let (_conn, mut rx) = h.connect_facilitator(42).await;

    let reply = h.router.route(backend, envelope(17, 42)).await.unwrap();

    assert_eq!(ack_status(&reply), AckStatus::Delivered);
    match reply {
        ServerMessage::NotificationAck {
            booking_id,
            facilitator_id,
            ..
        } => {
            assert_eq!(booking_id, 17);
            assert_eq!(facilitator_id, 42);
        }
        _ => unreachable!(),
    }

    // Exactly one push, and nothing persisted.
    let push = rx.try_recv().unwrap();
    assert!(matches!(push, ServerMessage::NewBooking { booking_id: 17, .. }));
    assert!(rx.try_recv().is_err());
    assert_eq!(h.store.total_count().await.unwrap(), 0);
}

#[tokio::test]
async fn offline_facilitator_gets_one_stored_row_and_no_push() {
    let h = Harness::new();
    let backend = h.connect_backend().await;

    let reply = h.router.route(backend, envelope(17, 42)).await.unwrap();

    assert_eq!(ack_status(&reply), AckStatus::Stored);
    assert_eq!(h.store.total_count().await.unwrap(), 1);
    assert_eq!(h.store.pending_count().await.unwrap(), 1);

    let row = h.store.row(1).await.unwrap();
    assert_eq!(row.facilitator_id, 42);
    assert_eq!(row.booking_id, 17);
    assert!(!row.delivered);
}

#[tokio::test]
async fn non_backend_submitter_is_rejected() {
    let h = Harness::new();
    let _backend = h.connect_backend().await;
    let (facilitator_conn, _rx) = h.connect_facilitator(7).await;

    let err = h
        .router
        .route(facilitator_conn, envelope(17, 42))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "authorization_error");
    assert_eq!(h.store.total_count().await.unwrap(), 0);

    // A connection that never authenticated at all fares no better.
    let stranger = h.registry.next_connection_id();
    let err = h.router.route(stranger, envelope(17, 42)).await.unwrap_err();
    assert_eq!(err.code(), "authorization_error");
}

#[tokio::test]
async fn superseded_backend_connection_loses_submit_rights() {
    let h = Harness::new();
    let first = h.connect_backend().await;
    let second = h.connect_backend().await;

    let err = h.router.route(first, envelope(17, 42)).await.unwrap_err();
    assert_eq!(err.code(), "authorization_error");

    let reply = h.router.route(second, envelope(17, 42)).await.unwrap();
    assert_eq!(ack_status(&reply), AckStatus::Stored);
}

#[tokio::test]
async fn incomplete_envelope_is_rejected_before_any_side_effect() {
    let h = Harness::new();
    let backend = h.connect_backend().await;

    let mut payload = envelope(17, 42);
    payload.session.as_mut().unwrap().title = None;

    let err = h.router.route(backend, payload).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");
    assert_eq!(err.to_string(), "missing field: session.title");
    assert_eq!(h.store.total_count().await.unwrap(), 0);
}

#[tokio::test]
async fn authorization_is_checked_before_validation() {
    let h = Harness::new();
    let stranger = h.registry.next_connection_id();

    // Both checks would fail; the submitter check must win.
    let err = h
        .router
        .route(stranger, BookingEventPayload::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "authorization_error");
}

#[tokio::test]
async fn persistence_failure_surfaces_instead_of_stored_ack() {
    let h = Harness::with_store(Arc::new(MemoryStore::failing()));
    let backend = h.connect_backend().await;

    let err = h.router.route(backend, envelope(17, 42)).await.unwrap_err();
    assert_eq!(err.code(), "persistence_failure");
}

#[tokio::test]
async fn replay_returns_pending_newest_first() {
    let h = Harness::new();
    let backend = h.connect_backend().await;

    for booking_id in [1, 2, 3] {
        h.router.route(backend, envelope(booking_id, 42)).await.unwrap();
    }

    let (conn, _rx) = h.connect_facilitator(42).await;
    let batch = h.replay.replay_pending(conn, Some(42)).await.unwrap().unwrap();

    match batch {
        ServerMessage::PendingNotifications {
            notifications,
            count,
        } => {
            assert_eq!(count, 3);
            let bookings: Vec<i64> = notifications.iter().map(|n| n.booking_id).collect();
            assert_eq!(bookings, vec![3, 2, 1]);
            assert!(notifications.iter().all(|n| n.kind == "new_booking"));
        }
        other => panic!("expected pending_notifications, got {other:?}"),
    }
}

#[tokio::test]
async fn replay_is_silent_when_nothing_is_pending() {
    let h = Harness::new();
    let (conn, _rx) = h.connect_facilitator(42).await;

    let batch = h.replay.replay_pending(conn, Some(42)).await.unwrap();
    assert!(batch.is_none());
}

#[tokio::test]
async fn replay_requires_registered_ownership() {
    let h = Harness::new();
    let backend = h.connect_backend().await;
    h.router.route(backend, envelope(17, 42)).await.unwrap();

    // A connection registered as facilitator 7 claims identity 42.
    let (intruder, _rx) = h.connect_facilitator(7).await;
    let err = h.replay.replay_pending(intruder, Some(42)).await.unwrap_err();
    assert_eq!(err.code(), "authorization_error");

    // An unregistered connection claiming the identity fails the same way.
    let stranger = h.registry.next_connection_id();
    let err = h.replay.replay_pending(stranger, Some(42)).await.unwrap_err();
    assert_eq!(err.code(), "authorization_error");
}

#[tokio::test]
async fn mark_read_requires_registered_ownership_and_leaves_row_unchanged() {
    let h = Harness::new();
    let backend = h.connect_backend().await;
    h.router.route(backend, envelope(17, 42)).await.unwrap();

    let (intruder, _rx) = h.connect_facilitator(7).await;
    let err = h.acks.mark_read(intruder, Some(42), Some(1)).await.unwrap_err();
    assert_eq!(err.code(), "authorization_error");
    assert!(!h.store.row(1).await.unwrap().delivered);
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let h = Harness::new();
    let backend = h.connect_backend().await;
    h.router.route(backend, envelope(17, 42)).await.unwrap();
    let (conn, _rx) = h.connect_facilitator(42).await;

    assert!(h.acks.mark_read(conn, Some(42), Some(1)).await.unwrap());
    assert!(h.store.row(1).await.unwrap().delivered);

    // Repeating the acknowledgment succeeds silently.
    assert!(h.acks.mark_read(conn, Some(42), Some(1)).await.unwrap());
    assert!(h.store.row(1).await.unwrap().delivered);
}

#[tokio::test]
async fn mark_read_on_foreign_notification_matches_nothing() {
    let h = Harness::new();
    let backend = h.connect_backend().await;
    h.router.route(backend, envelope(17, 42)).await.unwrap();

    // Facilitator 7 is registered and acknowledges 42's notification id.
    let (conn, _rx) = h.connect_facilitator(7).await;
    assert!(!h.acks.mark_read(conn, Some(7), Some(1)).await.unwrap());
    assert!(!h.store.row(1).await.unwrap().delivered);
}

#[tokio::test]
async fn store_then_reconnect_then_ack_then_silence() {
    let h = Harness::new();
    let backend = h.connect_backend().await;

    // Facilitator 42 is offline; the event is stored.
    let reply = h.router.route(backend, envelope(17, 42)).await.unwrap();
    assert_eq!(ack_status(&reply), AckStatus::Stored);

    // 42 connects and replays exactly that notification.
    let (conn, _rx) = h.connect_facilitator(42).await;
    let batch = h.replay.replay_pending(conn, Some(42)).await.unwrap().unwrap();
    let notification_id = match batch {
        ServerMessage::PendingNotifications {
            notifications,
            count,
        } => {
            assert_eq!(count, 1);
            assert_eq!(notifications[0].booking_id, 17);
            notifications[0].notification_id
        }
        other => panic!("expected pending_notifications, got {other:?}"),
    };

    // 42 acknowledges it.
    assert!(h.acks.mark_read(conn, Some(42), Some(notification_id)).await.unwrap());

    // 42 drops and reconnects: nothing pending, no batch at all.
    h.registry.unregister(conn).await;
    let (conn, _rx) = h.connect_facilitator(42).await;
    assert!(h.replay.replay_pending(conn, Some(42)).await.unwrap().is_none());
    assert_eq!(h.store.pending_count().await.unwrap(), 0);

    // The row itself is retained for the stats surface.
    assert_eq!(h.store.total_count().await.unwrap(), 1);
}

#[tokio::test]
async fn supersede_then_stale_disconnect_keeps_delivery_working() {
    let h = Harness::new();
    let backend = h.connect_backend().await;

    let (first, _rx1) = h.connect_facilitator(42).await;
    let (_second, mut rx2) = h.connect_facilitator(42).await;

    // The first connection's delayed disconnect must not evict the second.
    h.registry.unregister(first).await;
    assert!(h.registry.is_present(42).await);

    let reply = h.router.route(backend, envelope(17, 42)).await.unwrap();
    assert_eq!(ack_status(&reply), AckStatus::Delivered);
    assert!(matches!(
        rx2.try_recv().unwrap(),
        ServerMessage::NewBooking { booking_id: 17, .. }
    ));
}
