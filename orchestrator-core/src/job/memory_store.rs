//! In-memory `JobStore`: an insertion-ordered id sequence plus a map, guarded
//! by one lock so every transition is atomic (spec.md §4.2, §9).

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Job, JobStats, JobStatus, JobStore};

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    jobs: HashMap<String, Job>,
}

#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn add(&self, job: Job) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.inner.lock().jobs.get(id).cloned())
    }

    fn update(&self, job: Job) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.jobs.contains_key(&job.id) {
            inner.order.push(job.id.clone());
        }
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn try_assign(&self, id: &str, worker_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.worker_id = Some(worker_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn rollback(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Running => {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn complete(&self, id: &str, result: Value) -> Result<Option<Job>> {
        let mut inner = self.inner.lock();
        if let Some(job) = inner.jobs.get_mut(id) {
            job.status = JobStatus::Completed;
            job.result = Some(result);
            job.completed_at = Some(Utc::now());
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    fn fail(&self, id: &str, error: String) -> Result<Option<Job>> {
        let mut inner = self.inner.lock();
        if let Some(job) = inner.jobs.get_mut(id) {
            job.status = JobStatus::Failed;
            job.error = Some(error);
            job.completed_at = Some(Utc::now());
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    fn next_pending(&self) -> Result<Option<Job>> {
        let inner = self.inner.lock();
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .find(|job| job.status == JobStatus::Pending)
            .cloned())
    }

    fn list_pending(&self) -> Result<Vec<Job>> {
        let inner = self.inner.lock();
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| job.status == JobStatus::Pending)
            .cloned()
            .collect())
    }

    fn list(
        &self,
        limit: usize,
        offset: usize,
        status_filter: Option<JobStatus>,
    ) -> Result<(Vec<Job>, usize)> {
        let inner = self.inner.lock();
        let filtered: Vec<Job> = inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| status_filter.map(|s| s == job.status).unwrap_or(true))
            .cloned()
            .collect();
        let total = filtered.len();
        let page = filtered.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    fn stats(&self) -> Result<JobStats> {
        let inner = self.inner.lock();
        let mut stats = JobStats::default();
        for job in inner.jobs.values() {
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
    use super::*;

    fn job() -> Job {
        Job::new(
            "lua".into(),
            "zerverless".into(),
            "return 1".into(),
            None,
            HashMap::new(),
            30,
        )
    }

    #[test]
    fn try_assign_only_succeeds_from_pending() {
        let store = InMemoryJobStore::new();
        let j = job();
        let id = j.id.clone();
        store.add(j).unwrap();

        assert!(store.try_assign(&id, "w1").unwrap());
        // Already running: a second assign attempt must fail.
        assert!(!store.try_assign(&id, "w2").unwrap());

        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);
        assert_eq!(loaded.worker_id.as_deref(), Some("w1"));
    }

    #[test]
    fn rollback_clears_worker_and_returns_to_pending() {
        let store = InMemoryJobStore::new();
        let j = job();
        let id = j.id.clone();
        store.add(j).unwrap();
        store.try_assign(&id, "w1").unwrap();

        assert!(store.rollback(&id).unwrap());
        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert!(loaded.worker_id.is_none());
    }

    #[test]
    fn next_pending_is_fifo() {
        let store = InMemoryJobStore::new();
        let j1 = job();
        let j2 = job();
        let id1 = j1.id.clone();
        store.add(j1).unwrap();
        store.add(j2).unwrap();

        let next = store.next_pending().unwrap().unwrap();
        assert_eq!(next.id, id1);
    }

    #[test]
    fn list_filters_by_status_and_paginates() {
        let store = InMemoryJobStore::new();
        for _ in 0..3 {
            store.add(job()).unwrap();
        }
        let (page, total) = store.list(2, 0, Some(JobStatus::Pending)).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
    }
}
