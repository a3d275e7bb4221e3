//! `orchestrator serve`: binds the HTTP API (jobs, deployments, invocation,
//! worker channel) and runs until Ctrl+C, then drains for up to 5 seconds
//! before closing (spec.md §5 "Graceful shutdown").

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use orchestrator_core::{AppState, OrchestratorConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Bounded wait for outstanding handlers to drain after a shutdown signal
/// (spec.md §5 "Graceful shutdown: ... a bounded wait (5 s)").
const DRAIN_TIMEOUT_SECS: u64 = 5;

#[derive(Args)]
pub struct ServeCommand {
    /// Unique id for this orchestrator node
    #[arg(long, env = "NODE_ID")]
    pub node_id: Option<String>,

    /// Port the HTTP API (and worker channel) listen on
    #[arg(long, default_value_t = 8000, env = "HTTP_PORT")]
    pub http_port: u16,

    /// Enable verbose per-request debug logging
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Seconds between expected worker heartbeats
    #[arg(long, default_value_t = 30, env = "VOLUNTEER_HEARTBEAT_INTERVAL")]
    pub volunteer_heartbeat_interval: u64,

    /// Seconds of heartbeat silence before a worker is reaped
    #[arg(long, default_value_t = 60, env = "VOLUNTEER_TIMEOUT")]
    pub volunteer_timeout: u64,

    /// Path to a directory for the durable (sled) job/deployment store.
    /// Omit to run fully in-memory.
    #[arg(long, env = "ORCHESTRATOR_KV_PATH")]
    pub kv_path: Option<String>,

    /// Low end of the host port range used for docker deployments
    #[arg(long, default_value_t = 9000, env = "CONTAINER_PORT_RANGE_START")]
    pub container_port_start: u16,

    /// High end of the host port range used for docker deployments
    #[arg(long, default_value_t = 9999, env = "CONTAINER_PORT_RANGE_END")]
    pub container_port_end: u16,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let config = OrchestratorConfig {
            node_id: self.node_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            http_port: self.http_port,
            debug: self.debug,
            heartbeat_interval_secs: self.volunteer_heartbeat_interval,
            volunteer_timeout_secs: self.volunteer_timeout,
            container_port_range: self.container_port_start..=self.container_port_end,
            kv_path: self.kv_path,
        };

        let node_id = config.node_id.clone();
        let http_port = config.http_port;
        let heartbeat_interval = config.heartbeat_interval_secs;
        let volunteer_timeout = config.volunteer_timeout_secs;

        let state = AppState::new(config)?;
        spawn_stale_worker_reaper(state.clone(), heartbeat_interval, volunteer_timeout);

        let router = orchestrator_core::api::build_router(state);
        let listener = TcpListener::bind(("0.0.0.0", http_port)).await?;

        info!(node_id, http_port, "orchestrator listening");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let serve_task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        shutdown_signal().await;
        let _ = shutdown_tx.send(());

        // Bound the post-signal drain to 5s (spec.md §5): outstanding
        // handlers get a grace period, after which the process exits
        // regardless of what is still in flight.
        match tokio::time::timeout(Duration::from_secs(DRAIN_TIMEOUT_SECS), serve_task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => warn!(error = %e, "serve task panicked during shutdown"),
            Err(_) => warn!("graceful drain exceeded its {DRAIN_TIMEOUT_SECS}s bound, shutting down anyway"),
        }

        info!("orchestrator shut down cleanly");
        Ok(())
    }
}

/// Periodically removes workers whose last heartbeat is older than
/// `timeout_secs`, sweeping every `interval_secs` (spec.md §9: reaping based
/// on `VOLUNTEER_TIMEOUT` is left as a policy choice; an unreaped dead
/// connection is a real bug, so this wires it up — see DESIGN.md).
fn spawn_stale_worker_reaper(state: Arc<AppState>, interval_secs: u64, timeout_secs: u64) {
    let sweep_interval = Duration::from_secs(interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let reaped = state.workers.reap_stale(Duration::from_secs(timeout_secs));
            for id in reaped {
                warn!(worker_id = %id, "reaped stale worker (no heartbeat within timeout)");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining outstanding handlers");
}
