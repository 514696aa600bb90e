//! Routing of booking events: push to an online facilitator, or persist for
//! guaranteed later delivery.

use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{BookingEventPayload, NewNotification};
use crate::services::outbox::NotificationStore;
use crate::websocket::messages::ServerMessage;
use crate::websocket::registry::{ConnectionId, ConnectionRegistry};

#[derive(Clone)]
pub struct NotificationRouter {
    registry: ConnectionRegistry,
    outbox: Arc<dyn NotificationStore>,
}

impl NotificationRouter {
    pub fn new(registry: ConnectionRegistry, outbox: Arc<dyn NotificationStore>) -> Self {
        Self { registry, outbox }
    }

    /// Route one submitted event and produce the single reply owed to the
    /// backend connection.
    ///
    /// Only the connection currently holding the backend slot may submit;
    /// the envelope is validated field by field before any side effect. An
    /// online target gets the push directly (fire-and-forget, no retry) and
    /// no outbox row; an offline target gets exactly one outbox row. A
    /// failed durable write surfaces as an error, never as a `stored` ack.
    pub async fn route(
        &self,
        submitter: ConnectionId,
        payload: BookingEventPayload,
    ) -> AppResult<ServerMessage> {
        if !self.registry.is_backend(submitter).await {
            return Err(AppError::Authorization);
        }

        let event = payload.validate()?;

        let push = ServerMessage::new_booking(&event);
        if self
            .registry
            .send_to_facilitator(event.facilitator_id, push)
            .await
        {
            metrics::NOTIFICATIONS_DELIVERED.inc();
            info!(
                booking_id = event.booking_id,
                facilitator_id = event.facilitator_id,
                "notification pushed to online facilitator"
            );
            Ok(ServerMessage::delivered_ack(&event))
        } else {
            let stored = self
                .outbox
                .append(NewNotification::from_event(&event))
                .await?;
            metrics::NOTIFICATIONS_STORED.inc();
            info!(
                booking_id = event.booking_id,
                facilitator_id = event.facilitator_id,
                notification_id = stored.id,
                "facilitator offline, notification stored"
            );
            Ok(ServerMessage::stored_ack(&event, stored.created_at))
        }
    }
}
