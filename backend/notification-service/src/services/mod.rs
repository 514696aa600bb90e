pub mod acks;
pub mod auth;
pub mod outbox;
pub mod replay;
pub mod router;

pub use acks::AckTracker;
pub use auth::AuthGate;
pub use outbox::{NotificationStore, PgNotificationStore};
pub use replay::ReplayDispatcher;
pub use router::NotificationRouter;
