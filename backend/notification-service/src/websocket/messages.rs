//! Wire protocol for the notification WebSocket.
//!
//! Both directions are JSON text frames tagged by a `type` field. Inbound
//! event names mirror what the booking API and facilitator clients already
//! send; outbound frames carry the push, replay and acknowledgment shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{BookingEvent, BookingEventPayload, SessionSnapshot, StoredNotification, UserSnapshot};
use crate::websocket::registry::ConnectionId;

/// Messages a client may send.
///
/// Envelope and credential fields are optional at the wire layer so that a
/// submission is first attributed to a connection and only then inspected;
/// absence is rejected by the responsible component, not by the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Booking API identifying itself with the shared service token.
    BackendConnect { token: Option<String> },

    /// Facilitator client binding this connection to an identity.
    FacilitatorConnect {
        facilitator_id: Option<i64>,
        token: Option<String>,
    },

    /// A booking event submitted for routing.
    BookingNotification {
        #[serde(flatten)]
        payload: BookingEventPayload,
    },

    /// Explicit pull of undelivered notifications.
    GetPendingNotifications { facilitator_id: Option<i64> },

    /// Acknowledge one notification as read.
    MarkNotificationRead {
        facilitator_id: Option<i64>,
        notification_id: Option<i64>,
    },
}

/// Delivery outcome echoed to the backend, exactly one per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Delivered,
    Stored,
}

/// One replayed outbox entry: the original push fields plus the
/// server-assigned id and storage timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayedNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub booking_id: i64,
    pub user: UserSnapshot,
    pub session: SessionSnapshot,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub notification_id: i64,
    pub stored_at: DateTime<Utc>,
}

/// Messages the server emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting on socket establishment, before any authentication.
    Connected {
        connection_id: u64,
        timestamp: DateTime<Utc>,
    },

    /// Successful authentication handshake.
    AuthSuccess {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        facilitator_id: Option<i64>,
    },

    /// Real-time push to an online facilitator.
    NewBooking {
        booking_id: i64,
        user: UserSnapshot,
        session: SessionSnapshot,
        timestamp: DateTime<Utc>,
        message: String,
    },

    /// One batch of undelivered notifications, newest first. Never emitted
    /// empty.
    PendingNotifications {
        notifications: Vec<ReplayedNotification>,
        count: usize,
    },

    /// Backend reply for a routed event.
    NotificationAck {
        status: AckStatus,
        booking_id: i64,
        facilitator_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Confirmation that a stored notification was marked read.
    NotificationMarkedRead { notification_id: i64 },

    /// Request-scoped failure; the connection stays usable.
    Error { code: String, message: String },
}

/// Human-readable line shown in facilitator clients.
pub fn push_text(user: &UserSnapshot, session: &SessionSnapshot) -> String {
    format!("New booking from {} for {}", user.name, session.title)
}

impl ServerMessage {
    pub fn connected(conn: ConnectionId) -> Self {
        ServerMessage::Connected {
            connection_id: conn.as_u64(),
            timestamp: Utc::now(),
        }
    }

    pub fn auth_success(facilitator_id: Option<i64>) -> Self {
        ServerMessage::AuthSuccess {
            status: "authenticated".to_string(),
            facilitator_id,
        }
    }

    pub fn new_booking(event: &BookingEvent) -> Self {
        ServerMessage::NewBooking {
            booking_id: event.booking_id,
            user: event.user.clone(),
            session: event.session.clone(),
            timestamp: Utc::now(),
            message: push_text(&event.user, &event.session),
        }
    }

    pub fn delivered_ack(event: &BookingEvent) -> Self {
        ServerMessage::NotificationAck {
            status: AckStatus::Delivered,
            booking_id: event.booking_id,
            facilitator_id: event.facilitator_id,
            timestamp: Utc::now(),
        }
    }

    pub fn stored_ack(event: &BookingEvent, stored_at: DateTime<Utc>) -> Self {
        ServerMessage::NotificationAck {
            status: AckStatus::Stored,
            booking_id: event.booking_id,
            facilitator_id: event.facilitator_id,
            timestamp: stored_at,
        }
    }

    /// Assemble the replay batch from outbox rows, preserving their order.
    pub fn pending_batch(rows: &[StoredNotification]) -> Self {
        let notifications: Vec<ReplayedNotification> = rows
            .iter()
            .map(|row| ReplayedNotification {
                kind: "new_booking".to_string(),
                booking_id: row.booking_id,
                user: row.user.clone(),
                session: row.session.clone(),
                timestamp: row.created_at,
                message: push_text(&row.user, &row.session),
                notification_id: row.id,
                stored_at: row.created_at,
            })
            .collect();
        let count = notifications.len();
        ServerMessage::PendingNotifications {
            notifications,
            count,
        }
    }

    pub fn marked_read(notification_id: i64) -> Self {
        ServerMessage::NotificationMarkedRead { notification_id }
    }

    pub fn from_error(err: &AppError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
