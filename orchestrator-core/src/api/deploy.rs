//! `/api/deploy/*` (spec.md §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::deployment::Deployment;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::AppState;

const DEFAULT_DOCKER_PORT: u16 = 80;

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeployRequest {
    pub runtime: String,
    pub code: String,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeployResponse {
    pub user: String,
    pub path: String,
}

#[utoipa::path(
    post,
    path = "/api/deploy/{user}/{*path}",
    request_body = DeployRequest,
    responses((status = 201, body = DeployResponse), (status = 400))
)]
pub async fn create_deployment(
    State(state): State<Arc<AppState>>,
    Path((user, path)): Path<(String, String)>,
    Json(request): Json<DeployRequest>,
) -> OrchestratorResult<(StatusCode, Json<DeployResponse>)> {
    if request.runtime.trim().is_empty() || request.code.trim().is_empty() {
        return Err(OrchestratorError::Validation("runtime and code are required".to_string()));
    }

    let full_path = format!("/{path}");
    let port = if request.runtime == "docker" {
        Some(request.port.unwrap_or(DEFAULT_DOCKER_PORT))
    } else {
        None
    };

    let deployment = Deployment::new(user.clone(), full_path.clone(), request.runtime, request.code, port);
    state
        .deployments
        .set(deployment)
        .map_err(OrchestratorError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(DeployResponse {
            user,
            path: full_path,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/deploy/{user}/{*path}",
    responses((status = 204), (status = 404))
)]
pub async fn delete_deployment(
    State(state): State<Arc<AppState>>,
    Path((user, path)): Path<(String, String)>,
) -> OrchestratorResult<StatusCode> {
    let full_path = format!("/{path}");
    let existed = state
        .deployments
        .delete(&user, &full_path)
        .map_err(OrchestratorError::Internal)?;

    if !existed {
        return Err(OrchestratorError::NotFound(format!("{user}{full_path}")));
    }

    let key = Deployment::key_for(&user, &full_path);
    if let Err(e) = state.containers.stop_container_for_deployment(&key).await {
        tracing::warn!(%key, error = %e, "failed to stop container during deployment deletion");
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/deploy",
    responses((status = 200, body = [Deployment]))
)]
pub async fn list_deployments(State(state): State<Arc<AppState>>) -> OrchestratorResult<Json<Vec<Deployment>>> {
    Ok(Json(state.deployments.list().map_err(OrchestratorError::Internal)?))
}
