//! `/api/jobs` (spec.md §6).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::job::{Job, JobStatus};
use crate::AppState;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const RESERVED_NAMESPACE: &str = "zerverless";
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitJobRequest {
    pub job_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub input_data: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub wasm_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitJobResponse {
    pub id: String,
    pub status: JobStatus,
}

#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body = SubmitJobRequest,
    responses((status = 201, body = SubmitJobResponse), (status = 400))
)]
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitJobRequest>,
) -> OrchestratorResult<(StatusCode, Json<SubmitJobResponse>)> {
    if request.job_type.trim().is_empty() {
        return Err(OrchestratorError::Validation("job_type must not be empty".to_string()));
    }

    let job = Job::new(
        request.job_type,
        request.namespace.unwrap_or_else(|| RESERVED_NAMESPACE.to_string()),
        request.code.unwrap_or_default(),
        request.wasm_url,
        request.input_data.unwrap_or_default(),
        request.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
    );
    let id = job.id.clone();
    let status = job.status;

    state.jobs.add(job).map_err(OrchestratorError::Internal)?;
    let _ = state.dispatcher.dispatch_to_idle();

    Ok((StatusCode::CREATED, Json(SubmitJobResponse { id, status })))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path)),
    responses((status = 200, body = Job), (status = 404))
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> OrchestratorResult<Json<Job>> {
    state
        .jobs
        .get(&id)
        .map_err(OrchestratorError::Internal)?
        .map(Json)
        .ok_or_else(|| OrchestratorError::NotFound(id))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: usize,
}

#[utoipa::path(
    get,
    path = "/api/jobs",
    params(ListJobsQuery),
    responses((status = 200, body = ListJobsResponse))
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> OrchestratorResult<Json<ListJobsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let (jobs, total) = state
        .jobs
        .list(limit, offset, query.status)
        .map_err(OrchestratorError::Internal)?;
    Ok(Json(ListJobsResponse { jobs, total }))
}
