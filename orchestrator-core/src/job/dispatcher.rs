//! Dispatcher (spec.md §4.3). Transitions a job to `running` *before* handing
//! it to a worker, rolling back atomically if the send fails — this ordering
//! is what rules out double-dispatch (spec.md §4.3, §8 scenario 2).

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use super::{Job, JobStore};
use crate::channel::protocol::ServerMessage;
use crate::worker::WorkerRegistry;

/// Bounds `dispatch_to_idle`'s per-call iteration count so a round of
/// matching failures can never spin the shared locks tightly (spec.md §4.3).
const MAX_DISPATCH_ITERATIONS: usize = 10;

pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    workers: Arc<WorkerRegistry>,
}

fn to_job_message(job: &Job) -> ServerMessage {
    ServerMessage::Job {
        job_id: job.id.clone(),
        job_type: job.job_type.clone(),
        code: job.code.clone(),
        input_data: job.input.clone(),
        timeout_seconds: job.timeout_seconds,
        wasm_cid: None,
        wasm_url: job.fetch_url.clone(),
    }
}

impl Dispatcher {
    pub fn new(store: Arc<dyn JobStore>, workers: Arc<WorkerRegistry>) -> Self {
        Self { store, workers }
    }

    /// Pulls the next pending job and tries to hand it to `worker_id`.
    /// No-op if the queue is empty.
    pub fn try_dispatch(&self, worker_id: &str) -> Result<bool> {
        let Some(job) = self.store.next_pending()? else {
            return Ok(false);
        };
        self.try_dispatch_job(&job, worker_id)
    }

    /// Dispatches a specific job to a specific worker, guarded by the
    /// precondition that the job is still `pending` (enforced atomically by
    /// `JobStore::try_assign`).
    pub fn try_dispatch_job(&self, job: &Job, worker_id: &str) -> Result<bool> {
        if !self.store.try_assign(&job.id, worker_id)? {
            return Ok(false);
        }

        self.workers.mark_busy(worker_id, &job.id);

        if self.workers.send(worker_id, to_job_message(job)) {
            debug!(job_id = %job.id, worker_id, "dispatched job");
            Ok(true)
        } else {
            warn!(job_id = %job.id, worker_id, "send failed, rolling back to pending");
            self.store.rollback(&job.id)?;
            self.workers.mark_idle(worker_id);
            Ok(false)
        }
    }

    /// Repeatedly matches pending jobs to idle, capability-and-namespace
    /// compatible workers. Invoked on every dispatcher-relevant event:
    /// worker ready, job submitted, job completed (spec.md §4.3).
    pub fn dispatch_to_idle(&self) -> Result<()> {
        for _ in 0..MAX_DISPATCH_ITERATIONS {
            let Some(job) = self.store.next_pending()? else {
                break;
            };
            let Some(worker_id) = self
                .workers
                .get_idle_for_namespace(&job.job_type, &job.namespace)
            else {
                break;
            };
            if !self.try_dispatch_job(&job, &worker_id)? {
                // Either the job was claimed elsewhere or the send failed;
                // either way, re-evaluate from scratch next iteration.
                continue;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::sync::mpsc;

    use super::*;
    use crate::job::memory_store::InMemoryJobStore;
    use crate::worker::{Capabilities, Worker};

    fn setup() -> (Dispatcher, Arc<dyn JobStore>, Arc<WorkerRegistry>) {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let workers = Arc::new(WorkerRegistry::new());
        let dispatcher = Dispatcher::new(store.clone(), workers.clone());
        (dispatcher, store, workers)
    }

    #[test]
    fn dispatch_rolls_back_on_send_failure() {
        let (dispatcher, store, workers) = setup();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx); // closing the receiver makes every send fail
        workers.add(Worker::new("w1".into(), None, tx));
        workers.set_ready(
            "w1",
            Some(Capabilities {
                lua: true,
                ..Default::default()
            }),
        );

        let job = Job::new(
            "lua".into(),
            "zerverless".into(),
            "return 1".into(),
            None,
            HashMap::new(),
            30,
        );
        let id = job.id.clone();
        store.add(job).unwrap();

        assert!(!dispatcher.try_dispatch("w1").unwrap());
        let reloaded = store.get(&id).unwrap().unwrap();
        assert_eq!(reloaded.status, crate::job::JobStatus::Pending);
        assert!(reloaded.worker_id.is_none());
    }

    #[test]
    fn dispatch_to_idle_matches_namespace() {
        let (dispatcher, store, workers) = setup();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        workers.add(Worker::new("wa".into(), None, tx_a));
        workers.add(Worker::new("wb".into(), None, tx_b));
        workers.set_ready(
            "wb",
            Some(Capabilities {
                lua: true,
                namespaces: vec!["bob".into()],
                ..Default::default()
            }),
        );
        // wa stays busy so only wb is eligible.
        workers.mark_busy("wa", "other");
        let _ = &mut rx_a;

        let alice_job = Job::new(
            "lua".into(),
            "alice".into(),
            "code".into(),
            None,
            HashMap::new(),
            30,
        );
        let bob_job = Job::new(
            "lua".into(),
            "bob".into(),
            "code".into(),
            None,
            HashMap::new(),
            30,
        );
        let alice_id = alice_job.id.clone();
        let bob_id = bob_job.id.clone();
        store.add(alice_job).unwrap();
        store.add(bob_job).unwrap();

        dispatcher.dispatch_to_idle().unwrap();

        assert_eq!(
            store.get(&bob_id).unwrap().unwrap().status,
            crate::job::JobStatus::Running
        );
        assert_eq!(
            store.get(&alice_id).unwrap().unwrap().status,
            crate::job::JobStatus::Pending
        );
    }
}
