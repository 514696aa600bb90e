use std::sync::Arc;

use crate::config::Config;
use crate::services::acks::AckTracker;
use crate::services::auth::AuthGate;
use crate::services::outbox::NotificationStore;
use crate::services::replay::ReplayDispatcher;
use crate::services::router::NotificationRouter;
use crate::websocket::registry::ConnectionRegistry;

/// Everything a connection handler needs, assembled once at startup and
/// cloned per session. The registry is the only shared mutable in-memory
/// state; the outbox is shared through the store handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub outbox: Arc<dyn NotificationStore>,
    pub auth: Arc<AuthGate>,
    pub router: NotificationRouter,
    pub replay: ReplayDispatcher,
    pub acks: AckTracker,
}

impl AppState {
    pub fn new(config: Config, outbox: Arc<dyn NotificationStore>) -> Self {
        let registry = ConnectionRegistry::new();
        let auth = Arc::new(AuthGate::new(config.backend_service_token.clone()));
        let router = NotificationRouter::new(registry.clone(), outbox.clone());
        let replay = ReplayDispatcher::new(registry.clone(), outbox.clone());
        let acks = AckTracker::new(registry.clone(), outbox.clone());

        Self {
            config: Arc::new(config),
            registry,
            outbox,
            auth,
            router,
            replay,
            acks,
        }
    }
}
