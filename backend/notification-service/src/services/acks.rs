//! Acknowledgment of replayed notifications.

use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::services::outbox::NotificationStore;
use crate::websocket::registry::{ConnectionId, ConnectionRegistry};

#[derive(Clone)]
pub struct AckTracker {
    registry: ConnectionRegistry,
    outbox: Arc<dyn NotificationStore>,
}

impl AckTracker {
    pub fn new(registry: ConnectionRegistry, outbox: Arc<dyn NotificationStore>) -> Self {
        Self { registry, outbox }
    }

    /// Mark one notification delivered on behalf of its owner.
    ///
    /// Ownership follows the registry: the caller must be the connection
    /// currently registered for the claimed identity. The mutation is
    /// row-scoped to (notification, facilitator) and idempotent — an entry
    /// already delivered acknowledges again without error. Returns whether a
    /// row matched; acknowledging someone else's (or an unknown) id matches
    /// nothing and mutates nothing.
    pub async fn mark_read(
        &self,
        caller: ConnectionId,
        facilitator_id: Option<i64>,
        notification_id: Option<i64>,
    ) -> AppResult<bool> {
        let facilitator_id = facilitator_id.ok_or(AppError::Authorization)?;
        if !self.registry.owns_facilitator(caller, facilitator_id).await {
            return Err(AppError::Authorization);
        }

        let Some(notification_id) = notification_id else {
            return Ok(false);
        };

        let matched = self
            .outbox
            .mark_delivered(facilitator_id, notification_id)
            .await?;
        if matched {
            metrics::NOTIFICATIONS_ACKNOWLEDGED.inc();
            debug!(facilitator_id, notification_id, "notification marked read");
        }
        Ok(matched)
    }
}
