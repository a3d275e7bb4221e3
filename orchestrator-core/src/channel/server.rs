//! Worker channel connection handler (spec.md §4.4). Mirrors the
//! split-socket, spawned-writer-task shape the teacher uses for its own
//! WebSocket handlers (`temps-deployments/src/handlers/deployments.rs`),
//! adapted from one-way log streaming to this crate's bidirectional
//! control protocol.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{ClientMessage, ServerMessage};
use crate::job::JobStatus;
use crate::sync_overlay::SyncOutcome;
use crate::worker::Worker;
use crate::AppState;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_agent))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_agent: Option<String>) {
    let worker_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    state.workers.add(Worker::new(worker_id.clone(), user_agent, tx.clone()));
    info!(worker_id = %worker_id, "worker connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(ServerMessage::Ack {
        volunteer_id: worker_id.clone(),
        message: "connected".to_string(),
    });

    // Per-connection reads are processed one at a time below, which is what
    // gives per-worker ordering; there is no cross-worker ordering guarantee
    // since each connection runs on its own task (spec.md §4.4).
    while let Some(Ok(frame)) = stream.next().await {
        let Message::Text(text) = frame else { continue };
        let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
        match parsed {
            Ok(message) => handle_client_message(&state, &worker_id, message).await,
            Err(e) => warn!(worker_id = %worker_id, error = %e, "unparseable worker frame"),
        }
    }

    writer.abort();
    state.workers.remove(&worker_id);
    info!(worker_id = %worker_id, "worker disconnected");
}

async fn handle_client_message(state: &Arc<AppState>, worker_id: &str, message: ClientMessage) {
    match message {
        ClientMessage::Ready { capabilities } => {
            state.workers.set_ready(worker_id, capabilities);
            debug!(worker_id, "worker ready");
            let _ = state.dispatcher.dispatch_to_idle();
        }
        ClientMessage::Heartbeat => {
            state.workers.touch_heartbeat(worker_id);
            state.workers.send(
                worker_id,
                ServerMessage::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                },
            );
        }
        ClientMessage::Result { job_id, result } => {
            if state.sync_table.deliver(&job_id, SyncOutcome::Result(result.clone())) {
                state.workers.record_success(worker_id);
                state.workers.mark_idle(worker_id);
                let _ = state.dispatcher.dispatch_to_idle();
                return;
            }

            match state.jobs.complete(&job_id, result) {
                Ok(Some(job)) if job.status == JobStatus::Completed => {
                    state.resolver.on_completed(&job).await;
                }
                Ok(_) => {}
                Err(e) => warn!(job_id, error = %e, "failed to record job completion"),
            }
            state.workers.record_success(worker_id);
            state.workers.mark_idle(worker_id);
            let _ = state.dispatcher.dispatch_to_idle();
        }
        ClientMessage::Error { job_id, error } => {
            if state.sync_table.deliver(&job_id, SyncOutcome::Error(error.clone())) {
                state.workers.record_failure(worker_id);
                state.workers.mark_idle(worker_id);
                let _ = state.dispatcher.dispatch_to_idle();
                return;
            }

            if let Err(e) = state.jobs.fail(&job_id, error) {
                warn!(job_id, error = %e, "failed to record job failure");
            }
            state.workers.record_failure(worker_id);
            state.workers.mark_idle(worker_id);
            let _ = state.dispatcher.dispatch_to_idle();
        }
        ClientMessage::Quit => {
            debug!(worker_id, "worker requested graceful quit");
        }
        ClientMessage::Unknown => {
            debug!(worker_id, "ignoring unrecognised message type");
        }
    }
}
