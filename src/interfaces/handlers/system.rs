use actix_web::{get, web, HttpResponse, Responder};
use chrono::{NaiveDate, Utc};
use humantime::format_duration;
use serde::Serialize;
use std::time::Duration;

use crate::{constants::START_TIME, AppState};

#[derive(Serialize)]
struct HealthCheckResponse {
    status: &'static str,
    version: &'static str,
    uptime: String,
    timestamp: String,
    start_at: String,
    database: &'static str,
    latest_picture: Option<NaiveDate>,
    upstream: &'static str,
}

#[get("/health")]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let now_utc = Utc::now();
    let uptime = now_utc.signed_duration_since(*START_TIME).num_seconds().max(0) as u64;

    let apod = &state.apod_handler;
    let database = match apod.check_store().await {
        Ok(_) => "OK",
        Err(e) => {
            tracing::warn!("Health check store probe failed: {}", e);
            "Unavailable"
        }
    };
    let upstream = if apod.picture_source.is_configured() {
        "Configured"
    } else {
        "Demo key"
    };

    HttpResponse::Ok().json(HealthCheckResponse {
        status: if database == "OK" { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_duration(Duration::from_secs(uptime)).to_string(),
        timestamp: now_utc.to_rfc3339(),
        start_at: START_TIME.to_rfc3339(),
        database,
        latest_picture: apod.latest_picture_date().await,
        upstream,
    })
}
