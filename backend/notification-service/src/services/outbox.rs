//! Durable outbox for notifications that could not be pushed live.
//!
//! Entries are written once, replayed to their facilitator on reconnect, and
//! flipped to `delivered` on acknowledgment. Rows are never deleted; totals
//! stay available for the stats surface.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error::AppResult;
use crate::models::{NewNotification, SessionSnapshot, StoredNotification, UserSnapshot};

/// Storage abstraction for the outbox.
///
/// The production implementation is [`PgNotificationStore`]; tests substitute
/// an in-memory store.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Append one undelivered notification and return the stored row with
    /// its server-assigned id and storage timestamp.
    async fn append(&self, notification: NewNotification) -> AppResult<StoredNotification>;

    /// All undelivered entries for one facilitator, ordered by creation time
    /// descending (most recent first).
    async fn pending_for(&self, facilitator_id: i64) -> AppResult<Vec<StoredNotification>>;

    /// Set `delivered = true` on the entry owned by `facilitator_id`.
    /// Returns whether a row matched. Idempotent: repeating the call on an
    /// already-delivered entry matches again and succeeds.
    async fn mark_delivered(&self, facilitator_id: i64, notification_id: i64)
        -> AppResult<bool>;

    async fn total_count(&self) -> AppResult<i64>;

    async fn pending_count(&self) -> AppResult<i64>;
}

/// PostgreSQL-backed outbox. Each operation commits as its own atomic unit;
/// there are no multi-event transactions.
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_notification(row: &sqlx::postgres::PgRow) -> Result<StoredNotification, sqlx::Error> {
    Ok(StoredNotification {
        id: row.try_get("id")?,
        facilitator_id: row.try_get("facilitator_id")?,
        booking_id: row.try_get("booking_id")?,
        user: UserSnapshot {
            id: row.try_get("user_id")?,
            email: row.try_get("user_email")?,
            name: row.try_get("user_name")?,
        },
        session: SessionSnapshot {
            id: row.try_get("session_id")?,
            title: row.try_get("session_title")?,
            start_time: row.try_get("session_start_time")?,
        },
        created_at: row.try_get("created_at")?,
        delivered: row.try_get("delivered")?,
    })
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn append(&self, notification: NewNotification) -> AppResult<StoredNotification> {
        let row = sqlx::query(
            r#"
            INSERT INTO notifications (
                facilitator_id,
                booking_id,
                user_id,
                user_email,
                user_name,
                session_id,
                session_title,
                session_start_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, facilitator_id, booking_id, user_id, user_email, user_name,
                      session_id, session_title, session_start_time, created_at, delivered
            "#,
        )
        .bind(notification.facilitator_id)
        .bind(notification.booking_id)
        .bind(notification.user.id)
        .bind(&notification.user.email)
        .bind(&notification.user.name)
        .bind(notification.session.id)
        .bind(&notification.session.title)
        .bind(notification.session.start_time)
        .fetch_one(&self.pool)
        .await?;

        let stored = row_to_notification(&row)?;

        debug!(
            notification_id = stored.id,
            facilitator_id = stored.facilitator_id,
            booking_id = stored.booking_id,
            "notification stored for offline facilitator"
        );

        Ok(stored)
    }

    async fn pending_for(&self, facilitator_id: i64) -> AppResult<Vec<StoredNotification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, facilitator_id, booking_id, user_id, user_email, user_name,
                   session_id, session_title, session_start_time, created_at, delivered
            FROM notifications
            WHERE facilitator_id = $1 AND delivered = FALSE
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(facilitator_id)
        .fetch_all(&self.pool)
        .await?;

        let pending = rows
            .iter()
            .map(row_to_notification)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(facilitator_id, count = pending.len(), "fetched pending notifications");

        Ok(pending)
    }

    async fn mark_delivered(
        &self,
        facilitator_id: i64,
        notification_id: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET delivered = TRUE
            WHERE id = $1 AND facilitator_id = $2
            "#,
        )
        .bind(notification_id)
        .bind(facilitator_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn total_count(&self) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*)::BIGINT AS total FROM notifications")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total").unwrap_or(0))
    }

    async fn pending_count(&self) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*)::BIGINT AS pending FROM notifications WHERE delivered = FALSE",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("pending").unwrap_or(0))
    }
}
