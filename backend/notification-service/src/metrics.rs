use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Opts, TextEncoder};

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .unwrap_or_else(|e| panic!("failed to create {name}: {e}"));
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("failed to register {name}: {e}"));
    counter
}

pub static NOTIFICATIONS_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "notification_service_notifications_delivered_total",
        "Booking notifications pushed directly to an online facilitator",
    )
});

pub static NOTIFICATIONS_STORED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "notification_service_notifications_stored_total",
        "Booking notifications persisted for an offline facilitator",
    )
});

pub static NOTIFICATIONS_REPLAYED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "notification_service_notifications_replayed_total",
        "Stored notifications replayed to reconnected facilitators",
    )
});

pub static NOTIFICATIONS_ACKNOWLEDGED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "notification_service_notifications_acknowledged_total",
        "Stored notifications acknowledged as read",
    )
});

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
