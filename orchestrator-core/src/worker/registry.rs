//! Worker Registry (spec.md §4.1).
//!
//! Holds every connected `Worker` behind a single lock. Per spec.md §5, this
//! lock is never held alongside any other component's lock — all registry
//! methods take the lock, do their work, and release it before returning.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::{Capabilities, Worker, WorkerStats, WorkerStatus};
use crate::channel::protocol::ServerMessage;

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub id: String,
    pub capabilities: Capabilities,
    pub status: WorkerStatus,
    pub current_job_id: Option<String>,
    pub completed_count: u64,
    pub failed_count: u64,
    pub last_heartbeat: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
    pub user_agent: Option<String>,
}

impl From<&Worker> for WorkerSnapshot {
    fn from(w: &Worker) -> Self {
        Self {
            id: w.id.clone(),
            capabilities: w.capabilities.clone(),
            status: w.status,
            current_job_id: w.current_job_id.clone(),
            completed_count: w.completed_count,
            failed_count: w.failed_count,
            last_heartbeat: w.last_heartbeat,
            connected_at: w.connected_at,
            user_agent: w.user_agent.clone(),
        }
    }
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, worker: Worker) {
        let id = worker.id.clone();
        self.workers.write().insert(id, worker);
    }

    pub fn remove(&self, id: &str) -> bool {
        self.workers.write().remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<WorkerSnapshot> {
        self.workers.read().get(id).map(WorkerSnapshot::from)
    }

    pub fn list(&self) -> Vec<WorkerSnapshot> {
        self.workers.read().values().map(WorkerSnapshot::from).collect()
    }

    pub fn stats(&self) -> WorkerStats {
        let workers = self.workers.read();
        let connected = workers.len();
        let idle = workers
            .values()
            .filter(|w| w.status == WorkerStatus::Idle)
            .count();
        let busy = workers
            .values()
            .filter(|w| w.status == WorkerStatus::Busy)
            .count();
        WorkerStats {
            connected,
            idle,
            busy,
        }
    }

    /// First idle worker, in unspecified (map iteration) order. Repeated
    /// calls with no intervening state change must eventually surface every
    /// idle worker (spec.md §4.1) — true here because iteration walks the
    /// full map each time.
    pub fn get_idle(&self) -> Option<String> {
        self.workers
            .read()
            .values()
            .find(|w| w.status == WorkerStatus::Idle)
            .map(|w| w.id.clone())
    }

    pub fn get_idle_for_namespace(&self, job_type: &str, namespace: &str) -> Option<String> {
        self.workers
            .read()
            .values()
            .find(|w| {
                w.status == WorkerStatus::Idle
                    && w.capabilities.supports(job_type)
                    && w.capabilities.supports_namespace(namespace)
            })
            .map(|w| w.id.clone())
    }

    pub fn set_ready(&self, id: &str, capabilities: Option<Capabilities>) {
        let mut workers = self.workers.write();
        if let Some(w) = workers.get_mut(id) {
            if let Some(caps) = capabilities {
                w.capabilities = caps;
            }
            w.mark_idle();
            w.last_heartbeat = Utc::now();
        }
    }

    pub fn mark_busy(&self, id: &str, job_id: &str) {
        let mut workers = self.workers.write();
        if let Some(w) = workers.get_mut(id) {
            w.mark_busy(job_id.to_string());
        }
    }

    pub fn mark_idle(&self, id: &str) {
        let mut workers = self.workers.write();
        if let Some(w) = workers.get_mut(id) {
            w.mark_idle();
        }
    }

    pub fn record_success(&self, id: &str) {
        let mut workers = self.workers.write();
        if let Some(w) = workers.get_mut(id) {
            w.completed_count += 1;
        }
    }

    pub fn record_failure(&self, id: &str) {
        let mut workers = self.workers.write();
        if let Some(w) = workers.get_mut(id) {
            w.failed_count += 1;
        }
    }

    pub fn touch_heartbeat(&self, id: &str) {
        let mut workers = self.workers.write();
        if let Some(w) = workers.get_mut(id) {
            w.last_heartbeat = Utc::now();
        }
    }

    /// Sends a message on the worker's channel. Returns `false` (without
    /// panicking) if the worker is unknown or its channel has closed — the
    /// dispatcher treats either as a send-failure and rolls the job back.
    pub fn send(&self, id: &str, message: ServerMessage) -> bool {
        let workers = self.workers.read();
        match workers.get(id) {
            Some(w) => w.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Removes every worker whose last heartbeat is older than `timeout`,
    /// returning their ids. Wired to a periodic sweep (see SPEC_FULL.md §3) —
    /// spec.md leaves this as an open policy question but an unreaped dead
    /// connection is a real bug, not a design choice.
    pub fn reap_stale(&self, timeout: Duration) -> Vec<String> {
        let cutoff = Utc::now() - chrono::Duration::from_std(timeout).unwrap_or_default();
        let mut workers = self.workers.write();
        let stale: Vec<String> = workers
            .values()
            .filter(|w| w.last_heartbeat < cutoff)
            .map(|w| w.id.clone())
            .collect();
        for id in &stale {
            workers.remove(id);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn worker(id: &str) -> Worker {
        let (tx, _rx) = mpsc::unbounded_channel();
        Worker::new(id.to_string(), None, tx)
    }

    #[test]
    fn idle_selection_respects_capability_and_namespace() {
        let registry = WorkerRegistry::new();
        registry.add(worker("w1"));
        registry.add(worker("w2"));

        registry.set_ready(
            "w1",
            Some(Capabilities {
                lua: true,
                namespaces: vec!["alice".into()],
                ..Default::default()
            }),
        );
        registry.set_ready(
            "w2",
            Some(Capabilities {
                lua: true,
                namespaces: vec!["bob".into()],
                ..Default::default()
            }),
        );

        assert_eq!(
            registry.get_idle_for_namespace("lua", "bob"),
            Some("w2".to_string())
        );
        assert_eq!(registry.get_idle_for_namespace("python", "bob"), None);
    }

    #[test]
    fn stats_reflect_busy_and_idle_counts() {
        let registry = WorkerRegistry::new();
        registry.add(worker("w1"));
        registry.set_ready("w1", Some(Capabilities::default()));
        registry.mark_busy("w1", "job-1");

        let stats = registry.stats();
        assert_eq!(stats.connected, 1);
        assert_eq!(stats.busy, 1);
        assert_eq!(stats.idle, 0);
    }

    #[test]
    fn send_to_unknown_worker_fails_without_panic() {
        let registry = WorkerRegistry::new();
        assert!(!registry.send("ghost", ServerMessage::Ack {
            volunteer_id: "ghost".into(),
            message: "hi".into(),
        }));
    }
}
