//! Runtime configuration shared by the worker channel server, dispatcher, and
//! container manager. Values are supplied by `orchestrator-cli`'s `clap::Args`
//! (see spec.md §6 "Environment") and threaded through as a plain struct.

use std::ops::RangeInclusive;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub node_id: String,
    pub http_port: u16,
    pub debug: bool,
    pub heartbeat_interval_secs: u64,
    pub volunteer_timeout_secs: u64,
    pub container_port_range: RangeInclusive<u16>,
    pub kv_path: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            http_port: 8000,
            debug: false,
            heartbeat_interval_secs: 30,
            volunteer_timeout_secs: 60,
            container_port_range: 9000..=9999,
            kv_path: None,
        }
    }
}
