use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad or missing credential. The connection stays open and
    /// unauthenticated; nothing is mutated.
    #[error("{0}")]
    Authentication(String),

    /// Malformed or incomplete event envelope. Nothing is forwarded or
    /// persisted.
    #[error("missing field: {0}")]
    Validation(String),

    /// Caller is not the registered backend, or not the registered owner of
    /// the target facilitator identity.
    #[error("unauthorized")]
    Authorization,

    /// A durable write did not complete. Reported truthfully to the caller;
    /// retrying is the caller's responsibility.
    #[error("storage error: {0}")]
    Persistence(String),
}

impl AppError {
    /// Stable code carried on the wire in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Authentication(_) => "authentication_error",
            AppError::Validation(_) => "validation_error",
            AppError::Authorization => "authorization_error",
            AppError::Persistence(_) => "persistence_failure",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Authentication(_) => 401,
            AppError::Authorization => 403,
            AppError::Validation(_) => 400,
            AppError::Config(_) | AppError::Persistence(_) => 500,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = actix_web::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
        HttpResponse::build(status).json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }))
    }
}
