//! Orchestrator core: worker registry, job store/dispatcher, dependency
//! resolver, synchronous invocation overlay, container lifecycle manager,
//! deployment registry, reverse proxy, and invocation router. See
//! SPEC_FULL.md for the full component map.

pub mod api;
pub mod channel;
pub mod config;
pub mod container;
pub mod deployment;
pub mod error;
pub mod job;
pub mod kv;
pub mod proxy;
pub mod router;
pub mod sync_overlay;
pub mod worker;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, OrchestratorResult};

use container::ContainerManager;
use deployment::DeploymentRegistry;
use job::{Dispatcher, InMemoryJobStore, JobStore, KvJobStore};
use kv::{InMemoryKv, KvStore, SledKv};
use sync_overlay::PendingSyncTable;
use worker::WorkerRegistry;

/// Shared state handed to every HTTP handler and the worker channel server.
pub struct AppState {
    pub config: OrchestratorConfig,
    pub workers: Arc<WorkerRegistry>,
    pub jobs: Arc<dyn JobStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub resolver: Arc<job::DependencyResolver>,
    pub deployments: Arc<DeploymentRegistry>,
    pub containers: Arc<ContainerManager>,
    pub sync_table: Arc<PendingSyncTable>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: OrchestratorConfig) -> Result<Arc<Self>> {
        let kv: Arc<dyn KvStore> = match &config.kv_path {
            Some(path) => SledKv::open(path)?,
            None => InMemoryKv::new(),
        };

        let jobs: Arc<dyn JobStore> = if config.kv_path.is_some() {
            Arc::new(KvJobStore::new(kv.clone()))
        } else {
            Arc::new(InMemoryJobStore::new())
        };

        let workers = Arc::new(WorkerRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(jobs.clone(), workers.clone()));
        let deployments = Arc::new(DeploymentRegistry::new(kv.clone()));

        let docker = bollard::Docker::connect_with_local_defaults()?;
        let containers = Arc::new(ContainerManager::new(Arc::new(docker), config.container_port_range.clone()));

        let resolver = Arc::new(
            job::DependencyResolver::new(jobs.clone())
                .with_deployment_registry(deployments.clone())
                .with_container_manager(containers.clone()),
        );

        info!(node_id = %config.node_id, kv_backed = config.kv_path.is_some(), "orchestrator state initialised");

        Ok(Arc::new(Self {
            config,
            workers,
            jobs,
            dispatcher,
            resolver,
            deployments,
            containers,
            sync_table: Arc::new(PendingSyncTable::new()),
            started_at: Utc::now(),
        }))
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}
