//! Job records (spec.md §3) and the store/dispatcher/resolver that own them
//! (§4.2, §4.3, §4.5).

pub mod dispatcher;
pub mod kv_store;
pub mod memory_store;
pub mod resolver;
pub mod store;

pub use dispatcher::Dispatcher;
pub use kv_store::KvJobStore;
pub use memory_store::InMemoryJobStore;
pub use resolver::DependencyResolver;
pub use store::JobStore;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub namespace: String,
    pub code: String,
    #[serde(default)]
    pub fetch_url: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub input: HashMap<String, Value>,
    pub timeout_seconds: u64,
    pub status: JobStatus,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        job_type: String,
        namespace: String,
        code: String,
        fetch_url: Option<String>,
        input: HashMap<String, Value>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            namespace,
            code,
            fetch_url,
            input,
            timeout_seconds,
            status: JobStatus::Pending,
            result: None,
            error: None,
            worker_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, utoipa::ToSchema)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}
