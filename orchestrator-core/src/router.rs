//! Invocation Router (spec.md §4.10). The `/{user}/*` handler: resolves a
//! deployment and either proxies to its container or makes a synchronous
//! call into a worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::proxy;
use crate::sync_overlay::{self, SyncOutcome};
use crate::AppState;

/// The logical request the sync overlay's runtime-side convention expects:
/// the worker invokes `handle(req)` and returns `{status, headers, body}`
/// (spec.md §4.10 step 3).
#[derive(Debug, Serialize)]
struct HttpRequestEnvelope {
    method: String,
    path: String,
    query: String,
    headers: HashMap<String, String>,
    body: String,
}

#[derive(Debug, Deserialize)]
struct HandlerResponse {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: String,
}

fn default_status() -> u16 {
    200
}

pub async fn invoke(
    state: Arc<AppState>,
    user: String,
    path: String,
    method: Method,
    query: String,
    headers: HeaderMap,
    body: Bytes,
) -> OrchestratorResult<Response> {
    let full_path = format!("/{path}");
    let Some(deployment) = state
        .deployments
        .find(&user, &full_path)
        .map_err(OrchestratorError::Internal)?
    else {
        return Err(OrchestratorError::NotFound(format!("{user}{full_path}")));
    };

    if deployment.runtime == "docker" {
        let key = deployment.key();
        let container_port = deployment.port.unwrap_or(80);
        let info = match state.containers.get_container_info(&key) {
            Some(info) => info,
            None => state
                .containers
                .start_container_for_deployment(&key, &deployment.code, container_port)
                .await
                .map_err(|e| OrchestratorError::ContainerStart(e.to_string()))?,
        };

        // The mount prefix is "/" + user + the deployment's own (possibly
        // shorter than the request) path; the request path is "/" + user +
        // the full wildcard tail (spec.md §4.10 step 2).
        let deployment_path = format!("/{user}{}", deployment.path);
        let request_path = format!("/{user}{full_path}");
        let remainder = proxy::strip_prefix(&request_path, &deployment_path);
        let path_and_query = if query.is_empty() {
            remainder.to_string()
        } else {
            format!("{remainder}?{query}")
        };

        return proxy::forward_to_container(info.host_port, method, &path_and_query, headers, body).await;
    }

    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let envelope = HttpRequestEnvelope {
        method: method.to_string(),
        path: full_path,
        query,
        headers: header_map,
        body: String::from_utf8_lossy(&body).to_string(),
    };

    let mut input = HashMap::new();
    input.insert(
        "request".to_string(),
        serde_json::to_value(&envelope).unwrap_or(Value::Null),
    );

    let outcome = sync_overlay::execute_sync(
        &state.sync_table,
        &state.workers,
        &deployment.runtime,
        &deployment.code,
        input,
        Duration::from_secs(30),
        &user,
    )
    .await
    .map_err(OrchestratorError::Internal)?;

    match outcome {
        sync_overlay::SyncInvocationResult::NoWorker => Err(OrchestratorError::NoCapacity),
        sync_overlay::SyncInvocationResult::TimedOut => Err(OrchestratorError::Timeout),
        sync_overlay::SyncInvocationResult::Completed(SyncOutcome::Error(message)) => {
            Err(OrchestratorError::ExecutionFailure(message))
        }
        sync_overlay::SyncInvocationResult::Completed(SyncOutcome::Result(value)) => {
            Ok(render_handler_response(value))
        }
    }
}

fn render_handler_response(value: Value) -> Response {
    let parsed: HandlerResponse = serde_json::from_value(value.clone()).unwrap_or(HandlerResponse {
        status: 200,
        headers: HashMap::new(),
        body: value.to_string(),
    });

    let status = StatusCode::from_u16(parsed.status).unwrap_or(StatusCode::OK);
    let mut response = (status, parsed.body).into_response();
    for (name, val) in parsed.headers {
        if let (Ok(name), Ok(val)) = (
            axum::http::HeaderName::try_from(name.as_str()),
            axum::http::HeaderValue::from_str(&val),
        ) {
            response.headers_mut().insert(name, val);
        } else {
            warn!(name, "dropping invalid handler response header");
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_response_defaults_to_200() {
        let value = serde_json::json!({"body": "hi"});
        let response = render_handler_response(value);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn handler_response_honours_explicit_status() {
        let value = serde_json::json!({"status": 404, "body": "nope"});
        let response = render_handler_response(value);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
