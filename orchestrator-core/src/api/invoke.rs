//! `ANY /{user}/*` invocation entrypoint (spec.md §4.10, §6).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method};
use axum::response::Response;

use crate::error::OrchestratorResult;
use crate::router;
use crate::AppState;

pub async fn invoke(
    State(state): State<Arc<AppState>>,
    Path((user, path)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> OrchestratorResult<Response> {
    router::invoke(state, user, path, method, query.unwrap_or_default(), headers, body).await
}
