//! Synchronous Invocation Overlay (spec.md §4.6). A request/response layer
//! on top of the (otherwise fire-and-forget) worker channel, used by
//! invocation handlers that need a reply before they can answer an HTTP
//! request. Grounded in the same one-shot-rendezvous-behind-a-mutex shape
//! the teacher uses for its job-queue wait points (`temps-queue/src/queue.rs`),
//! adapted here to a single-slot table keyed by synthetic job id instead of a
//! persistent queue.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::channel::protocol::ServerMessage;
use crate::worker::WorkerRegistry;

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Result(Value),
    Error(String),
}

/// Map from synthetic job id to a single-use rendezvous slot (spec.md §3
/// "Pending-Sync Table").
#[derive(Default)]
pub struct PendingSyncTable {
    slots: Mutex<HashMap<String, oneshot::Sender<SyncOutcome>>>,
}

impl PendingSyncTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, job_id: String) -> oneshot::Receiver<SyncOutcome> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(job_id, tx);
        rx
    }

    fn remove(&self, job_id: &str) {
        self.slots.lock().remove(job_id);
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.slots.lock().contains_key(job_id)
    }

    /// Delivers a reply to a waiting slot, if one still exists. A reply
    /// arriving after the slot was removed (timeout, cancellation, or an
    /// already-delivered reply) is silently dropped — spec.md §4.6 invariant
    /// (i): at most one reply is ever delivered.
    pub fn deliver(&self, job_id: &str, outcome: SyncOutcome) -> bool {
        let sender = self.slots.lock().remove(job_id);
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug)]
pub enum SyncInvocationResult {
    Completed(SyncOutcome),
    NoWorker,
    TimedOut,
}

/// Wraps HTTP invocation input so a `docker` runtime receives it as a single
/// `INPUT` environment variable, per spec.md §4.6 step 4.
fn wrap_input_for_docker(input: &HashMap<String, Value>) -> HashMap<String, Value> {
    let mut wrapped = HashMap::new();
    wrapped.insert(
        "INPUT".to_string(),
        Value::String(serde_json::to_string(input).unwrap_or_default()),
    );
    wrapped
}

/// Implements spec.md §4.6 `executeSync`. Returns `NoWorker` immediately if
/// no idle worker matches `runtime`/`namespace`; otherwise races the worker's
/// reply against `timeout`, guaranteeing the slot is removed and the worker
/// released on every exit path (invariants ii and iii).
pub async fn execute_sync(
    table: &PendingSyncTable,
    workers: &WorkerRegistry,
    runtime: &str,
    code: &str,
    input: HashMap<String, Value>,
    timeout: Duration,
    namespace: &str,
) -> anyhow::Result<SyncInvocationResult> {
    let Some(worker_id) = workers.get_idle_for_namespace(runtime, namespace) else {
        return Ok(SyncInvocationResult::NoWorker);
    };

    let job_id = format!("sync-{}", Uuid::new_v4());
    let rx = table.insert(job_id.clone());

    workers.mark_busy(&worker_id, &job_id);

    let input_data = if runtime == "docker" {
        wrap_input_for_docker(&input)
    } else {
        input
    };

    let message = ServerMessage::Job {
        job_id: job_id.clone(),
        job_type: runtime.to_string(),
        code: code.to_string(),
        input_data,
        timeout_seconds: timeout.as_secs(),
        wasm_cid: None,
        wasm_url: None,
    };

    if !workers.send(&worker_id, message) {
        table.remove(&job_id);
        workers.mark_idle(&worker_id);
        return Ok(SyncInvocationResult::NoWorker);
    }

    let outcome = tokio::time::timeout(timeout, rx).await;

    // The slot may already be gone if `deliver` raced us past the timeout
    // window; removing an absent key is a no-op either way.
    table.remove(&job_id);
    workers.mark_idle(&worker_id);

    match outcome {
        Ok(Ok(result)) => Ok(SyncInvocationResult::Completed(result)),
        Ok(Err(_)) => Ok(SyncInvocationResult::TimedOut),
        Err(_) => Ok(SyncInvocationResult::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::worker::{Capabilities, Worker};

    fn registry_with_idle_worker(id: &str) -> (WorkerRegistry, mpsc::UnboundedReceiver<ServerMessage>) {
        let registry = WorkerRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.add(Worker::new(id.to_string(), None, tx));
        registry.set_ready(
            id,
            Some(Capabilities {
                lua: true,
                ..Default::default()
            }),
        );
        (registry, rx)
    }

    #[tokio::test]
    async fn returns_no_worker_when_none_match() {
        let table = PendingSyncTable::new();
        let registry = WorkerRegistry::new();
        let result = execute_sync(
            &table,
            &registry,
            "lua",
            "return 1",
            HashMap::new(),
            Duration::from_millis(50),
            "zerverless",
        )
        .await
        .unwrap();
        assert!(matches!(result, SyncInvocationResult::NoWorker));
    }

    #[tokio::test]
    async fn delivered_reply_completes_before_timeout() {
        let table = std::sync::Arc::new(PendingSyncTable::new());
        let (registry, mut rx) = registry_with_idle_worker("w1");
        let registry = std::sync::Arc::new(registry);

        let table_clone = table.clone();
        let registry_clone = registry.clone();
        let call = tokio::spawn(async move {
            execute_sync(
                &table_clone,
                &registry_clone,
                "lua",
                "return 1",
                HashMap::new(),
                Duration::from_secs(5),
                "zerverless",
            )
            .await
            .unwrap()
        });

        let job_message = rx.recv().await.unwrap();
        let ServerMessage::Job { job_id, .. } = job_message else {
            panic!("expected Job message");
        };
        assert!(table.deliver(&job_id, SyncOutcome::Result(serde_json::json!(1))));

        match call.await.unwrap() {
            SyncInvocationResult::Completed(SyncOutcome::Result(v)) => assert_eq!(v, serde_json::json!(1)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(registry.get("w1").unwrap().status, crate::worker::WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn timeout_releases_worker_and_removes_slot() {
        let table = PendingSyncTable::new();
        let (registry, _rx) = registry_with_idle_worker("w1");

        let result = execute_sync(
            &table,
            &registry,
            "lua",
            "return 1",
            HashMap::new(),
            Duration::from_millis(20),
            "zerverless",
        )
        .await
        .unwrap();

        assert!(matches!(result, SyncInvocationResult::TimedOut));
        assert_eq!(registry.get("w1").unwrap().status, crate::worker::WorkerStatus::Idle);
        assert!(!table.contains("whatever"));
    }

    #[test]
    fn late_reply_after_removal_is_dropped() {
        let table = PendingSyncTable::new();
        let _rx = table.insert("job-1".to_string());
        table.remove("job-1");
        assert!(!table.deliver("job-1", SyncOutcome::Error("late".to_string())));
    }
}
