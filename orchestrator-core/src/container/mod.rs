//! Container lifecycle (spec.md §4.8). One-to-one with a live deployment key
//! (`user + path`).

pub mod manager;
pub mod port_allocator;

pub use manager::ContainerManager;
pub use port_allocator::PortAllocator;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub container_id: String,
    pub image_tag: String,
    pub host_port: u16,
    pub container_port: u16,
    pub started_at: DateTime<Utc>,
}
