//! Replay of stored notifications to a reconnected facilitator.

use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::services::outbox::NotificationStore;
use crate::websocket::messages::ServerMessage;
use crate::websocket::registry::{ConnectionId, ConnectionRegistry};

#[derive(Clone)]
pub struct ReplayDispatcher {
    registry: ConnectionRegistry,
    outbox: Arc<dyn NotificationStore>,
}

impl ReplayDispatcher {
    pub fn new(registry: ConnectionRegistry, outbox: Arc<dyn NotificationStore>) -> Self {
        Self { registry, outbox }
    }

    /// Collect the undelivered batch for `facilitator_id`, newest first.
    ///
    /// The caller must be the connection currently registered for that
    /// identity; the registry, not the claim, decides. Returns `None` when
    /// nothing is pending — no empty batch is ever emitted.
    pub async fn replay_pending(
        &self,
        caller: ConnectionId,
        facilitator_id: Option<i64>,
    ) -> AppResult<Option<ServerMessage>> {
        let facilitator_id = facilitator_id.ok_or(AppError::Authorization)?;
        if !self.registry.owns_facilitator(caller, facilitator_id).await {
            return Err(AppError::Authorization);
        }

        let pending = self.outbox.pending_for(facilitator_id).await?;
        if pending.is_empty() {
            return Ok(None);
        }

        metrics::NOTIFICATIONS_REPLAYED.inc_by(pending.len() as u64);
        info!(
            facilitator_id,
            count = pending.len(),
            "replaying pending notifications"
        );
        Ok(Some(ServerMessage::pending_batch(&pending)))
    }
}
