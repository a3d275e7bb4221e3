//! HTTP API surface (spec.md §6), assembled the way the teacher's CLI
//! assembles its own router: plain axum `Router`, OpenAPI schema generated
//! via `utoipa`, Swagger UI mounted alongside it
//! (`temps-cli/src/commands/serve/console.rs`).

pub mod deploy;
pub mod invoke;
pub mod jobs;
pub mod system;

use std::sync::Arc;

use axum::routing::{any, get, post};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::channel::server::ws_handler;
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        system::health,
        system::info,
        system::stats,
        jobs::submit_job,
        jobs::get_job,
        jobs::list_jobs,
        deploy::create_deployment,
        deploy::delete_deployment,
        deploy::list_deployments,
    ),
    components(schemas(
        system::HealthResponse,
        system::InfoResponse,
        system::StatsResponse,
        crate::worker::WorkerStats,
        crate::job::JobStats,
        crate::job::Job,
        crate::job::JobStatus,
        jobs::SubmitJobRequest,
        jobs::SubmitJobResponse,
        jobs::ListJobsResponse,
        deploy::DeployRequest,
        deploy::DeployResponse,
        crate::deployment::Deployment,
    )),
    info(title = "Zerverless Orchestrator API", version = "0.1.0")
)]
struct ApiDoc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/info", get(system::info))
        .route("/stats", get(system::stats))
        .route("/api/jobs", post(jobs::submit_job).get(jobs::list_jobs))
        .route("/api/jobs/{id}", get(jobs::get_job))
        .route(
            "/api/deploy/{user}/{*path}",
            post(deploy::create_deployment).delete(deploy::delete_deployment),
        )
        .route("/api/deploy", get(deploy::list_deployments))
        .route("/ws/volunteer", get(ws_handler))
        .route("/{user}/{*path}", any(invoke::invoke))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}
