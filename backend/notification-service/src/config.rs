use crate::error::AppError;
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    /// The one shared secret the booking API presents on `backend_connect`.
    pub backend_service_token: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5002);

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let backend_service_token = env::var("BACKEND_SERVICE_TOKEN")
            .map_err(|_| AppError::Config("BACKEND_SERVICE_TOKEN missing".into()))?;
        if backend_service_token.is_empty() {
            return Err(AppError::Config("BACKEND_SERVICE_TOKEN is empty".into()));
        }

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            backend_service_token,
        })
    }
}
