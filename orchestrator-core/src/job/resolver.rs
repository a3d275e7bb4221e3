//! Dependency Resolver (spec.md §4.5). A post-completion hook that turns
//! build job results into either dispatched follow-up jobs or live
//! deployments. Mirrors the job-output extraction style of the teacher's
//! deployment jobs (`temps-deployments/src/jobs/deploy_static.rs`,
//! `mark_deployment_complete.rs`), which pull a typed field out of a
//! previous job's output rather than assume a fixed payload shape.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Job, JobStore};
use crate::container::{ContainerInfo, ContainerManager};
use crate::deployment::{Deployment, DeploymentRegistry};

pub struct DependencyResolver {
    store: Arc<dyn JobStore>,
    deployments: Option<Arc<DeploymentRegistry>>,
    containers: Option<Arc<ContainerManager>>,
}

/// Pulls a string field out of a result that is either a JSON object or a
/// JSON-string-encoded object (spec.md §4.5: "either a map field or
/// JSON-string-encoded").
fn extract_field(result: &Value, field: &str) -> Option<String> {
    if let Some(s) = result.get(field).and_then(Value::as_str) {
        return Some(s.to_string());
    }
    if let Some(raw) = result.as_str() {
        let parsed: Value = serde_json::from_str(raw).ok()?;
        return parsed.get(field).and_then(Value::as_str).map(String::from);
    }
    None
}

fn extract_u16(result: &Value, field: &str) -> Option<u16> {
    if let Some(n) = result.get(field).and_then(Value::as_u64) {
        return u16::try_from(n).ok();
    }
    if let Some(raw) = result.as_str() {
        let parsed: Value = serde_json::from_str(raw).ok()?;
        return parsed.get(field).and_then(Value::as_u64).and_then(|n| u16::try_from(n).ok());
    }
    None
}

impl DependencyResolver {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            deployments: None,
            containers: None,
        }
    }

    pub fn with_deployment_registry(mut self, registry: Arc<DeploymentRegistry>) -> Self {
        self.deployments = Some(registry);
        self
    }

    pub fn with_container_manager(mut self, manager: Arc<ContainerManager>) -> Self {
        self.containers = Some(manager);
        self
    }

    /// Invoked by the channel server after a job transitions to `completed`.
    pub async fn on_completed(&self, job: &Job) {
        let Some(result) = &job.result else { return };

        match job.job_type.as_str() {
            "docker-build" => self.resolve_build(job, result),
            "docker-deploy" => self.resolve_deploy(result),
            "docker-build-deploy" => self.resolve_build_deploy(result).await,
            _ => {}
        }
    }

    fn resolve_build(&self, job: &Job, result: &Value) {
        let Some(image_tag) = extract_field(result, "image_tag") else {
            warn!(job_id = %job.id, "docker-build completed without image_tag, skipping resolution");
            return;
        };

        let pending = match self.store.list_pending() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to list pending jobs for dependency resolution");
                return;
            }
        };

        for mut dependent in pending {
            if dependent.job_type != "docker-deploy" {
                continue;
            }
            let waits_on_this_build = dependent
                .input
                .get("build_job_id")
                .and_then(Value::as_str)
                .is_some_and(|id| id == job.id);
            if !waits_on_this_build {
                continue;
            }

            dependent.code = image_tag.clone();
            if let Err(e) = self.store.update(dependent.clone()) {
                warn!(job_id = %dependent.id, error = %e, "failed to update dependent docker-deploy job");
                continue;
            }
            debug!(job_id = %dependent.id, %image_tag, "resolved docker-deploy dependency");
        }
    }

    fn resolve_deploy(&self, result: &Value) {
        let Some(deployments) = &self.deployments else { return };

        let (Some(image_tag), Some(user), Some(path)) = (
            extract_field(result, "image_tag"),
            extract_field(result, "user"),
            extract_field(result, "path"),
        ) else {
            warn!("docker-deploy completed without image_tag/user/path, skipping promotion");
            return;
        };

        let deployment = Deployment::new(user, path, "docker".to_string(), image_tag, None);
        if let Err(e) = deployments.set(deployment) {
            warn!(error = %e, "failed to persist deployment from docker-deploy result");
        }
    }

    async fn resolve_build_deploy(&self, result: &Value) {
        let Some(deployments) = &self.deployments else { return };

        let (Some(image_tag), Some(user), Some(path)) = (
            extract_field(result, "image_tag"),
            extract_field(result, "user"),
            extract_field(result, "path"),
        ) else {
            warn!("docker-build-deploy completed without image_tag/user/path, skipping promotion");
            return;
        };

        // `Deployment.port` is the *container* port, not the host port the
        // worker picked (spec.md §3, §4.5: "Persist the Deployment with ...
        // `port=80` default").
        let container_port = extract_u16(result, "container_port").unwrap_or(80);
        let deployment = Deployment::new(
            user,
            path,
            "docker".to_string(),
            image_tag.clone(),
            Some(container_port),
        );
        let key = deployment.key();

        if let Err(e) = deployments.set(deployment) {
            warn!(error = %e, "failed to persist deployment from docker-build-deploy result");
            return;
        }

        let Some(containers) = &self.containers else { return };

        match (
            extract_field(result, "container_id"),
            extract_u16(result, "host_port"),
        ) {
            (Some(container_id), Some(host_port)) => {
                // The worker already started the container; track it so
                // invocations reuse it instead of starting a duplicate.
                containers.register_existing(
                    &key,
                    ContainerInfo {
                        container_id,
                        image_tag: image_tag.clone(),
                        host_port,
                        container_port,
                        started_at: chrono::Utc::now(),
                    },
                );
            }
            _ => {
                if let Err(e) = containers
                    .start_container_for_deployment(&key, &image_tag, container_port)
                    .await
                {
                    warn!(%key, error = %e, "failed to start container for docker-build-deploy result");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::job::memory_store::InMemoryJobStore;

    fn completed_build_job(id_for_result: &str) -> Job {
        let mut job = Job::new(
            "docker-build".to_string(),
            "zerverless".to_string(),
            "build-script".to_string(),
            None,
            HashMap::new(),
            60,
        );
        job.id = id_for_result.to_string();
        job.result = Some(json!({"image_tag": "app:v1"}));
        job
    }

    #[tokio::test]
    async fn docker_build_updates_waiting_deploy_jobs() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let build = completed_build_job("build-1");

        let mut input = HashMap::new();
        input.insert("build_job_id".to_string(), json!("build-1"));
        let deploy_job = Job::new(
            "docker-deploy".to_string(),
            "zerverless".to_string(),
            String::new(),
            None,
            input,
            60,
        );
        let deploy_id = deploy_job.id.clone();
        store.add(deploy_job).unwrap();

        let resolver = DependencyResolver::new(store.clone());
        resolver.on_completed(&build).await;

        let updated = store.get(&deploy_id).unwrap().unwrap();
        assert_eq!(updated.code, "app:v1");
    }

    #[tokio::test]
    async fn docker_build_ignores_unrelated_deploy_jobs() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let build = completed_build_job("build-2");

        let mut input = HashMap::new();
        input.insert("build_job_id".to_string(), json!("some-other-build"));
        let deploy_job = Job::new(
            "docker-deploy".to_string(),
            "zerverless".to_string(),
            String::new(),
            None,
            input,
            60,
        );
        let deploy_id = deploy_job.id.clone();
        store.add(deploy_job).unwrap();

        let resolver = DependencyResolver::new(store.clone());
        resolver.on_completed(&build).await;

        let untouched = store.get(&deploy_id).unwrap().unwrap();
        assert_eq!(untouched.code, "");
    }

    #[tokio::test]
    async fn docker_deploy_promotes_deployment_from_string_encoded_result() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let registry = Arc::new(DeploymentRegistry::new(crate::kv::InMemoryKv::new()));

        let mut job = Job::new(
            "docker-deploy".to_string(),
            "zerverless".to_string(),
            String::new(),
            None,
            HashMap::new(),
            60,
        );
        job.result = Some(Value::String(
            json!({"image_tag": "app:v2", "user": "alice", "path": "/svc"}).to_string(),
        ));

        let resolver = DependencyResolver::new(store).with_deployment_registry(registry.clone());
        resolver.on_completed(&job).await;

        let deployment = registry.get("alice", "/svc").unwrap().unwrap();
        assert_eq!(deployment.code, "app:v2");
    }

    #[tokio::test]
    async fn missing_fields_are_skipped_without_promoting() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let registry = Arc::new(DeploymentRegistry::new(crate::kv::InMemoryKv::new()));

        let mut job = Job::new(
            "docker-deploy".to_string(),
            "zerverless".to_string(),
            String::new(),
            None,
            HashMap::new(),
            60,
        );
        job.result = Some(json!({"image_tag": "app:v3"}));

        let resolver = DependencyResolver::new(store).with_deployment_registry(registry.clone());
        resolver.on_completed(&job).await;

        assert!(registry.list().unwrap().is_empty());
    }
}
