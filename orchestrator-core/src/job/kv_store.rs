//! Durable `JobStore` backed by a `KvStore` (spec.md §4.2, §6). Records are
//! serialised under `jobs/<id>`; FIFO order is reconstructed by sorting on
//! `created_at` ascending, since the backend has no native insertion-order
//! iteration.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Job, JobStats, JobStatus, JobStore};
use crate::kv::KvStore;

const PREFIX: &str = "jobs/";

pub struct KvJobStore {
    kv: Arc<dyn KvStore>,
    /// A single lock around the read-modify-write cycle of the atomic
    /// transitions below. The backend itself has no compare-and-swap
    /// primitive we rely on, so correctness comes from serialising callers
    /// through this mutex rather than from the store.
    transition_lock: Mutex<()>,
}

impl KvJobStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            transition_lock: Mutex::new(()),
        }
    }

    fn key(id: &str) -> String {
        format!("{PREFIX}{id}")
    }

    fn load(&self, id: &str) -> Result<Option<Job>> {
        match self.kv.get(&Self::key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, job: &Job) -> Result<()> {
        let bytes = serde_json::to_vec(job)?;
        self.kv.put(&Self::key(&job.id), &bytes)
    }

    fn all(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .kv
            .scan_prefix(PREFIX)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice::<Job>(&bytes))
            .collect::<std::result::Result<_, _>>()?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

impl JobStore for KvJobStore {
    fn add(&self, job: Job) -> Result<()> {
        self.save(&job)
    }

    fn get(&self, id: &str) -> Result<Option<Job>> {
        self.load(id)
    }

    fn update(&self, job: Job) -> Result<()> {
        self.save(&job)
    }

    fn try_assign(&self, id: &str, worker_id: &str) -> Result<bool> {
        let _guard = self.transition_lock.lock();
        match self.load(id)? {
            Some(mut job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.worker_id = Some(worker_id.to_string());
                self.save(&job)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn rollback(&self, id: &str) -> Result<bool> {
        let _guard = self.transition_lock.lock();
        match self.load(id)? {
            Some(mut job) if job.status == JobStatus::Running => {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                self.save(&job)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn complete(&self, id: &str, result: Value) -> Result<Option<Job>> {
        let _guard = self.transition_lock.lock();
        match self.load(id)? {
            Some(mut job) => {
                job.status = JobStatus::Completed;
                job.result = Some(result);
                job.completed_at = Some(chrono::Utc::now());
                self.save(&job)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    fn fail(&self, id: &str, error: String) -> Result<Option<Job>> {
        let _guard = self.transition_lock.lock();
        match self.load(id)? {
            Some(mut job) => {
                job.status = JobStatus::Failed;
                job.error = Some(error);
                job.completed_at = Some(chrono::Utc::now());
                self.save(&job)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    fn next_pending(&self) -> Result<Option<Job>> {
        Ok(self
            .all()?
            .into_iter()
            .find(|job| job.status == JobStatus::Pending))
    }

    fn list_pending(&self) -> Result<Vec<Job>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|job| job.status == JobStatus::Pending)
            .collect())
    }

    fn list(
        &self,
        limit: usize,
        offset: usize,
        status_filter: Option<JobStatus>,
    ) -> Result<(Vec<Job>, usize)> {
        let filtered: Vec<Job> = self
            .all()?
            .into_iter()
            .filter(|job| status_filter.map(|s| s == job.status).unwrap_or(true))
            .collect();
        let total = filtered.len();
        let page = filtered.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    fn stats(&self) -> Result<JobStats> {
        let mut stats = JobStats::default();
        for job in self.all()? {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => {}
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::kv::InMemoryKv;

    fn store() -> KvJobStore {
        KvJobStore::new(InMemoryKv::new())
    }

    fn job() -> Job {
        Job::new(
            "python".into(),
            "zerverless".into(),
            "print(1)".into(),
            None,
            HashMap::new(),
            30,
        )
    }

    #[test]
    fn fifo_order_survives_reconstruction_from_created_at() {
        let store = store();
        let j1 = job();
        let mut j2 = job();
        j2.created_at = j1.created_at + chrono::Duration::seconds(1);
        let id1 = j1.id.clone();
        store.add(j2.clone()).unwrap();
        store.add(j1).unwrap();

        let next = store.next_pending().unwrap().unwrap();
        assert_eq!(next.id, id1);
    }

    #[test]
    fn assign_then_rollback_round_trips() {
        let store = store();
        let j = job();
        let id = j.id.clone();
        store.add(j).unwrap();

        assert!(store.try_assign(&id, "w1").unwrap());
        assert!(!store.try_assign(&id, "w2").unwrap());
        assert!(store.rollback(&id).unwrap());
        assert_eq!(store.get(&id).unwrap().unwrap().status, JobStatus::Pending);
    }
}
