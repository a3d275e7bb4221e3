//! `/health`, `/info`, `/stats` (spec.md §6).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

#[derive(Serialize, ToSchema)]
pub struct InfoResponse {
    node_id: String,
    version: &'static str,
    uptime_seconds: i64,
}

#[utoipa::path(get, path = "/info", responses((status = 200, body = InfoResponse)))]
pub async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        node_id: state.config.node_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}

#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    workers: crate::worker::WorkerStats,
    jobs: crate::job::JobStats,
}

#[utoipa::path(get, path = "/stats", responses((status = 200, body = StatsResponse)))]
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let jobs = state.jobs.stats().unwrap_or_default();
    Json(StatsResponse {
        workers: state.workers.stats(),
        jobs,
    })
}
