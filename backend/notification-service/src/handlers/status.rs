//! Health and stats endpoints.
//!
//! Liveness here covers this subsystem only; deep dependency checks belong
//! to the surrounding platform.

use actix_web::{web, HttpResponse, Result as ActixResult};
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

/// GET /health
pub async fn health(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "notification-service",
        "timestamp": Utc::now(),
        "online_facilitators": state.registry.online_facilitator_count().await,
        "backend_connected": state.registry.backend_connected().await,
    })))
}

/// GET /stats
pub async fn stats(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let total = state.outbox.total_count().await?;
    let pending = state.outbox.pending_count().await?;

    Ok(HttpResponse::Ok().json(json!({
        "online_facilitators": state.registry.online_facilitator_count().await,
        "backend_connected": state.registry.backend_connected().await,
        "total_notifications": total,
        "pending_notifications": pending,
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/stats", web::get().to(stats));
}
