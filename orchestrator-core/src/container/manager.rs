//! Container Manager (spec.md §4.8). Starts/stops the single container that
//! backs each docker deployment, allocates host ports, and probes readiness.

use std::collections::HashMap;
use std::net::TcpStream;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{ContainerInfo, PortAllocator};

const READINESS_ATTEMPTS: u32 = 10;
const READINESS_INTERVAL: Duration = Duration::from_millis(500);
const STOP_TIMEOUT_SECS: i32 = 10;

pub struct ContainerManager {
    docker: Arc<Docker>,
    containers: RwLock<HashMap<String, ContainerInfo>>,
    ports: PortAllocator,
}

/// Derives `zerverless-<key>`, mapping everything outside
/// `[A-Za-z0-9_.-]` to `-`, trimming leading/trailing dashes, and forcing
/// the first character to be alphanumeric (spec.md §4.8 step 2).
pub fn sanitize_container_name(key: &str) -> String {
    let raw = format!("zerverless-{key}");
    let mut sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    sanitized = sanitized.trim_matches('-').to_string();

    match sanitized.chars().next() {
        Some(c) if c.is_ascii_alphanumeric() => sanitized,
        Some(_) => format!("c{sanitized}"),
        None => "c".to_string(),
    }
}

impl ContainerManager {
    pub fn new(docker: Arc<Docker>, port_range: RangeInclusive<u16>) -> Self {
        Self {
            docker,
            containers: RwLock::new(HashMap::new()),
            ports: PortAllocator::new(port_range),
        }
    }

    pub fn get_container_info(&self, key: &str) -> Option<ContainerInfo> {
        self.containers.read().get(key).cloned()
    }

    /// Tracks a container a worker already started (spec.md §4.5
    /// `docker-build-deploy`: "If the worker did not start a container ...
    /// ask it to start one" implies the converse — when it did, the manager
    /// must still end up tracking it so later invocations reuse it instead
    /// of starting a duplicate). Reserves `host_port` in the allocator so it
    /// is never handed out to a different deployment.
    pub fn register_existing(&self, key: &str, info: ContainerInfo) {
        self.ports.reserve(info.host_port);
        self.containers.write().insert(key.to_string(), info);
    }

    pub fn list_containers(&self) -> Vec<(String, ContainerInfo)> {
        self.containers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn is_running(&self, container_id: &str) -> bool {
        matches!(
            self.docker
                .inspect_container(container_id, None::<InspectContainerOptions>)
                .await,
            Ok(c) if c.state.and_then(|s| s.running).unwrap_or(false)
        )
    }

    async fn remove_containers_named(&self, name: &str) -> Result<()> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        let existing = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: Some(filters),
                ..Default::default()
            }))
            .await?;

        for container in existing {
            let Some(id) = container.id else { continue };
            let _ = self
                .docker
                .remove_container(
                    &id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
        }
        Ok(())
    }

    /// Starts (or reuses) the single container for `key`. See spec.md §4.8
    /// for the full step-by-step contract.
    pub async fn start_container_for_deployment(
        &self,
        key: &str,
        image_tag: &str,
        container_port: u16,
    ) -> Result<ContainerInfo> {
        if let Some(existing) = self.get_container_info(key) {
            if self.is_running(&existing.container_id).await {
                return Ok(existing);
            }
            self.ports.release(existing.host_port);
            self.containers.write().remove(key);
        }

        let name = sanitize_container_name(key);
        self.remove_containers_named(&name).await?;

        let host_port = self.ports.allocate()?;
        let result = self
            .create_and_start(&name, image_tag, host_port, container_port)
            .await;

        let container_id = match result {
            Ok(id) => id,
            Err(e) => {
                self.ports.release(host_port);
                return Err(e);
            }
        };

        let info = ContainerInfo {
            container_id: container_id.clone(),
            image_tag: image_tag.to_string(),
            host_port,
            container_port,
            started_at: chrono::Utc::now(),
        };
        self.containers.write().insert(key.to_string(), info.clone());

        self.wait_for_readiness(key, &container_id, host_port).await?;

        Ok(self.get_container_info(key).unwrap_or(info))
    }

    async fn create_and_start(
        &self,
        name: &str,
        image_tag: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<String> {
        let port_key = format!("{container_port}/tcp");
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![bollard::models::PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        );
        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key, HashMap::new());

        let mut tmpfs = HashMap::new();
        tmpfs.insert("/var/cache/nginx".to_string(), String::new());
        tmpfs.insert("/var/run".to_string(), String::new());
        tmpfs.insert("/tmp".to_string(), String::new());

        let host_config = bollard::models::HostConfig {
            port_bindings: Some(port_bindings),
            network_mode: Some("bridge".to_string()),
            restart_policy: Some(bollard::models::RestartPolicy {
                name: Some(bollard::models::RestartPolicyNameEnum::UNLESS_STOPPED),
                ..Default::default()
            }),
            memory: Some(256 * 1024 * 1024),
            memory_swap: Some(256 * 1024 * 1024), // equal to memory: swap disabled
            readonly_rootfs: Some(false),
            tmpfs: Some(tmpfs),
            // Web servers commonly need CHOWN at startup; don't drop all caps.
            cap_drop: None,
            ..Default::default()
        };

        let config = bollard::models::ContainerCreateBody {
            image: Some(image_tag.to_string()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(
                Some(
                    bollard::query_parameters::CreateContainerOptionsBuilder::new()
                        .name(name)
                        .build(),
                ),
                config,
            )
            .await
            .map_err(|e| anyhow!("failed to create container {name}: {e}"))?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await
            .map_err(|e| anyhow!("failed to start container {name}: {e}"))?;

        Ok(container.id)
    }

    async fn wait_for_readiness(&self, key: &str, container_id: &str, host_port: u16) -> Result<()> {
        for attempt in 1..=READINESS_ATTEMPTS {
            let inspect = self
                .docker
                .inspect_container(container_id, None::<InspectContainerOptions>)
                .await;

            if let Ok(container) = &inspect {
                if let Some(state) = &container.state {
                    if state.running == Some(false) && state.status.is_some() {
                        let exit_code = state.exit_code.unwrap_or(-1);
                        self.ports.release(host_port);
                        self.containers.write().remove(key);
                        let _ = self
                            .docker
                            .remove_container(
                                container_id,
                                Some(RemoveContainerOptions {
                                    force: true,
                                    ..Default::default()
                                }),
                            )
                            .await;
                        return Err(anyhow!(
                            "container {container_id} exited during startup (code {exit_code})"
                        ));
                    }
                }
            }

            if TcpStream::connect(("127.0.0.1", host_port)).is_ok() {
                debug!(key, attempt, "container became ready");
                return Ok(());
            }

            tokio::time::sleep(READINESS_INTERVAL).await;
        }

        warn!(
            key,
            host_port, "container did not become ready within {READINESS_ATTEMPTS} attempts, proceeding anyway"
        );
        Ok(())
    }

    pub async fn stop_container_for_deployment(&self, key: &str) -> Result<()> {
        let Some(info) = self.containers.write().remove(key) else {
            return Ok(());
        };

        let _ = self
            .docker
            .stop_container(
                &info.container_id,
                Some(StopContainerOptions {
                    t: Some(STOP_TIMEOUT_SECS),
                    ..Default::default()
                }),
            )
            .await;
        let _ = self
            .docker
            .remove_container(
                &info.container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        self.ports.release(info.host_port);
        info!(key, container_id = %info.container_id, "stopped and removed container");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_to_allowed_charset() {
        let name = sanitize_container_name("alice//weird path!@#");
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'));
        assert!(!name.starts_with('-'));
        assert!(!name.ends_with('-'));
        assert!(name.chars().next().unwrap().is_ascii_alphanumeric());
    }

    #[test]
    fn sanitization_is_deterministic() {
        assert_eq!(
            sanitize_container_name("bob/app"),
            sanitize_container_name("bob/app")
        );
    }

    #[test]
    fn leading_special_characters_are_trimmed_then_forced_alphanumeric() {
        let name = sanitize_container_name("---/weird");
        assert!(name.chars().next().unwrap().is_ascii_alphanumeric());
    }
}
