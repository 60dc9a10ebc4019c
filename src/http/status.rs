//! Operational endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::telemetry::TelemetryStats;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn healthz() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Queue and delivery counters of the telemetry pipeline.
pub async fn telemetry_stats(State(state): State<AppState>) -> Json<TelemetryStats> {
    Json(state.telemetry.stats())
}
