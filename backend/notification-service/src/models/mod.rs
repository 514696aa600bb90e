use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Denormalized booking-user snapshot carried inside every notification.
/// Captured at event time; never re-read from the user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: i64,
    pub email: String,
    pub name: String,
}

/// Denormalized session snapshot carried inside every notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
}

/// A fully validated booking event, as the router sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEvent {
    pub booking_id: i64,
    pub user: UserSnapshot,
    pub session: SessionSnapshot,
    pub facilitator_id: i64,
}

/// The raw envelope as submitted over the wire. Every field is optional so
/// that the submitter's authorization can be checked before the payload is
/// inspected; [`BookingEventPayload::validate`] then rejects field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingEventPayload {
    pub booking_id: Option<i64>,
    pub user: Option<UserSnapshotPayload>,
    pub session: Option<SessionSnapshotPayload>,
    pub facilitator_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSnapshotPayload {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshotPayload {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

impl BookingEventPayload {
    /// Check every required field, top-level and nested, and produce the
    /// strongly typed event. The first absent field is reported; nothing is
    /// persisted or forwarded on failure.
    pub fn validate(self) -> AppResult<BookingEvent> {
        let booking_id = self.booking_id.ok_or(missing("booking_id"))?;
        let user = self.user.ok_or(missing("user"))?;
        let session = self.session.ok_or(missing("session"))?;
        let facilitator_id = self.facilitator_id.ok_or(missing("facilitator_id"))?;

        let user = UserSnapshot {
            id: user.id.ok_or(missing("user.id"))?,
            email: user.email.ok_or(missing("user.email"))?,
            name: user.name.ok_or(missing("user.name"))?,
        };

        let session = SessionSnapshot {
            id: session.id.ok_or(missing("session.id"))?,
            title: session.title.ok_or(missing("session.title"))?,
            start_time: session.start_time.ok_or(missing("session.start_time"))?,
        };

        Ok(BookingEvent {
            booking_id,
            user,
            session,
            facilitator_id,
        })
    }
}

fn missing(field: &str) -> AppError {
    AppError::Validation(field.to_string())
}

/// A notification awaiting (or past) delivery, as persisted in the outbox.
/// Payload fields are immutable after creation; only `delivered` mutates,
/// and only false -> true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: i64,
    pub facilitator_id: i64,
    pub booking_id: i64,
    pub user: UserSnapshot,
    pub session: SessionSnapshot,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}

/// Insert payload for the outbox.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub facilitator_id: i64,
    pub booking_id: i64,
    pub user: UserSnapshot,
    pub session: SessionSnapshot,
}

impl NewNotification {
    pub fn from_event(event: &BookingEvent) -> Self {
        Self {
            facilitator_id: event.facilitator_id,
            booking_id: event.booking_id,
            user: event.user.clone(),
            session: event.session.clone(),
        }
    }
}
