//! Admission of connections as backend or facilitator.

use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::websocket::registry::{ConnectionId, ConnectionRegistry, MessageSender};

/// Gate deciding which role, if any, a connection may assume. Failure leaves
/// the connection open and unauthenticated; there is no retry limit.
pub struct AuthGate {
    backend_token: String,
}

impl AuthGate {
    pub fn new(backend_token: String) -> Self {
        Self { backend_token }
    }

    /// Admit the single trusted upstream sender. The claimed token must
    /// equal the configured service secret; on success the connection takes
    /// the backend slot, superseding any prior backend connection.
    pub async fn authenticate_backend(
        &self,
        registry: &ConnectionRegistry,
        conn: ConnectionId,
        sender: MessageSender,
        token: Option<&str>,
    ) -> AppResult<()> {
        match token {
            Some(claimed) if claimed == self.backend_token => {
                registry.register_backend(conn, sender).await;
                Ok(())
            }
            _ => {
                warn!(conn = conn.as_u64(), "backend authentication rejected");
                Err(AppError::Authentication("invalid token".into()))
            }
        }
    }

    /// Admit a facilitator connection and register its presence.
    ///
    /// TODO: verify `token` against the booking API's JWT issuer before
    /// trusting the claimed identity; today any present facilitator_id is
    /// accepted and the credential is ignored.
    pub async fn authenticate_facilitator(
        &self,
        registry: &ConnectionRegistry,
        conn: ConnectionId,
        sender: MessageSender,
        facilitator_id: Option<i64>,
        _token: Option<&str>,
    ) -> AppResult<i64> {
        let facilitator_id = facilitator_id
            .ok_or_else(|| AppError::Authentication("facilitator id required".into()))?;

        registry
            .register_facilitator(facilitator_id, conn, sender)
            .await;
        info!(facilitator_id, conn = conn.as_u64(), "facilitator authenticated");
        Ok(facilitator_id)
    }
}
