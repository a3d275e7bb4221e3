//! Worker records (spec.md §3) and the registry that owns them (§4.1).

pub mod capabilities;
pub mod registry;

pub use capabilities::Capabilities;
pub use registry::WorkerRegistry;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::channel::protocol::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Disconnected,
}

/// A connected worker. Owned exclusively by the `WorkerRegistry`.
pub struct Worker {
    pub id: String,
    pub capabilities: Capabilities,
    pub status: WorkerStatus,
    pub current_job_id: Option<String>,
    pub completed_count: u64,
    pub failed_count: u64,
    pub last_heartbeat: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub connected_at: DateTime<Utc>,
    /// Sending half of the worker's outbound message channel; the channel
    /// read loop owns the other half and forwards frames to the socket.
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Worker {
    pub fn new(id: String, user_agent: Option<String>, sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        let now = Utc::now();
        Self {
            id,
            capabilities: Capabilities::default(),
            status: WorkerStatus::Disconnected,
            current_job_id: None,
            completed_count: 0,
            failed_count: 0,
            last_heartbeat: now,
            user_agent,
            connected_at: now,
            sender,
        }
    }

    pub fn mark_idle(&mut self) {
        self.status = WorkerStatus::Idle;
        self.current_job_id = None;
    }

    pub fn mark_busy(&mut self, job_id: String) {
        self.status = WorkerStatus::Busy;
        self.current_job_id = Some(job_id);
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct WorkerStats {
    pub connected: usize,
    pub idle: usize,
    pub busy: usize,
}
