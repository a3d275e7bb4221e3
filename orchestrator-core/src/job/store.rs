//! `JobStore` contract (spec.md §4.2). Both implementations — in-memory and
//! `sled`-backed — satisfy identical semantics: FIFO-by-insertion pending
//! iteration, and atomic `pending <-> running` transitions so that no reader
//! ever observes a job that is simultaneously `running` with a worker id and
//! `pending` with none (spec.md §5, §8).

use anyhow::Result;
use serde_json::Value;

use super::{Job, JobStats, JobStatus};

pub trait JobStore: Send + Sync {
    fn add(&self, job: Job) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<Job>>;
    fn update(&self, job: Job) -> Result<()>;

    /// Atomically transitions `id` from `Pending` to `Running` with
    /// `worker_id`. Returns `false` (no-op) if the job is missing or not
    /// currently `Pending` — the precondition `tryDispatchJob` relies on.
    fn try_assign(&self, id: &str, worker_id: &str) -> Result<bool>;

    /// Atomically transitions `id` from `Running` back to `Pending`,
    /// clearing the worker id. Used by the dispatcher's rollback path.
    fn rollback(&self, id: &str) -> Result<bool>;

    fn complete(&self, id: &str, result: Value) -> Result<Option<Job>>;
    fn fail(&self, id: &str, error: String) -> Result<Option<Job>>;

    /// Next pending job in FIFO (insertion) order, without removing it.
    fn next_pending(&self) -> Result<Option<Job>>;
    fn list_pending(&self) -> Result<Vec<Job>>;

    fn list(
        &self,
        limit: usize,
        offset: usize,
        status_filter: Option<JobStatus>,
    ) -> Result<(Vec<Job>, usize)>;

    fn stats(&self) -> Result<JobStats>;
}
