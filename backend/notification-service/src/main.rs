use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use notification_service::{
    handlers::status::register_routes as register_status,
    logging, metrics,
    services::PgNotificationStore,
    websocket::session::ws_route,
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;

    tracing::info!(port = config.port, "starting notification service");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("database ready");

    let outbox = Arc::new(PgNotificationStore::new(pool));
    let state = AppState::new(config.clone(), outbox);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .service(ws_route)
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(register_status)
    })
    .bind(&addr)?
    .run()
    .await
    .context("server error")
}
