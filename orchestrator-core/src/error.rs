//! Error taxonomy shared across the orchestrator core.
//!
//! Mirrors the propagation policy in spec.md §7: runtime-internal errors are
//! surfaced to the caller verbatim, everything else is logged and mapped to a
//! fixed HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("no capable worker is connected")]
    NoCapacity,

    #[error("request timed out waiting for a worker reply")]
    Timeout,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    ExecutionFailure(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("container failed to start: {0}")]
    ContainerStart(String),

    #[error("upstream proxy error: {0}")]
    Proxy(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// RFC 7807 problem-details body, matching the shape the teacher's
/// `problemdetails` helper produces.
#[derive(Serialize)]
struct ProblemDetails {
    title: String,
    status: u16,
    detail: String,
}

impl OrchestratorError {
    fn status(&self) -> StatusCode {
        match self {
            OrchestratorError::NoCapacity => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::ExecutionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::ContainerStart(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OrchestratorError::Proxy(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = ProblemDetails {
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
