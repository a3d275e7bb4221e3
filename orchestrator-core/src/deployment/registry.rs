//! Deployment Registry (spec.md §4.7). Bindings are persisted under
//! `deployments/<user>/<path>` (spec.md §6), so the same `KvStore` used for
//! jobs can back this registry.

use std::sync::Arc;

use anyhow::Result;

use super::Deployment;
use crate::kv::KvStore;

pub struct DeploymentRegistry {
    kv: Arc<dyn KvStore>,
}

impl DeploymentRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(user: &str, path: &str) -> String {
        format!("deployments/{user}{path}")
    }

    pub fn set(&self, deployment: Deployment) -> Result<()> {
        let key = Self::key(&deployment.user, &deployment.path);
        let bytes = serde_json::to_vec(&deployment)?;
        self.kv.put(&key, &bytes)
    }

    pub fn get(&self, user: &str, path: &str) -> Result<Option<Deployment>> {
        match self.kv.get(&Self::key(user, path))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolves `(user, full_path)` to the deployment mounted at the
    /// longest path prefix of `full_path` (spec.md §4.10 step 1: a
    /// deployment binds a mount point, not just an exact path — an
    /// invocation under a sub-path of that mount must still resolve).
    pub fn find(&self, user: &str, full_path: &str) -> Result<Option<Deployment>> {
        for prefix in path_prefixes(full_path) {
            if let Some(deployment) = self.get(user, &prefix)? {
                return Ok(Some(deployment));
            }
        }
        Ok(None)
    }

    pub fn delete(&self, user: &str, path: &str) -> Result<bool> {
        let existed = self.get(user, path)?.is_some();
        self.kv.delete(&Self::key(user, path))?;
        Ok(existed)
    }

    pub fn list(&self) -> Result<Vec<Deployment>> {
        self.kv
            .scan_prefix("deployments/")
            .map(|entries| {
                entries
                    .into_iter()
                    .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
                    .collect()
            })
    }
}

/// Yields `full_path` and each of its `/`-delimited ancestors, longest
/// first, down to `/`. `"/html/about"` yields `["/html/about", "/html", "/"]`.
fn path_prefixes(full_path: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut current = full_path.to_string();
    loop {
        candidates.push(current.clone());
        if current == "/" {
            break;
        }
        match current.rfind('/') {
            Some(0) => current = "/".to_string(),
            Some(idx) => current.truncate(idx),
            None => break,
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;

    #[test]
    fn set_get_delete_round_trip() {
        let registry = DeploymentRegistry::new(InMemoryKv::new());
        let dep = Deployment::new(
            "alice".into(),
            "/hello".into(),
            "lua".into(),
            "return 1".into(),
            None,
        );
        registry.set(dep.clone()).unwrap();

        let fetched = registry.get("alice", "/hello").unwrap().unwrap();
        assert_eq!(fetched.code, "return 1");

        assert!(registry.delete("alice", "/hello").unwrap());
        assert!(registry.get("alice", "/hello").unwrap().is_none());
        assert!(!registry.delete("alice", "/hello").unwrap());
    }

    #[test]
    fn upsert_replaces_existing_binding() {
        let registry = DeploymentRegistry::new(InMemoryKv::new());
        let dep = Deployment::new("u".into(), "/p".into(), "docker".into(), "img:1".into(), Some(80));
        registry.set(dep).unwrap();
        let dep2 = Deployment::new("u".into(), "/p".into(), "docker".into(), "img:2".into(), Some(80));
        registry.set(dep2).unwrap();

        let fetched = registry.get("u", "/p").unwrap().unwrap();
        assert_eq!(fetched.code, "img:2");
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn find_resolves_sub_paths_to_the_longest_mount_prefix() {
        let registry = DeploymentRegistry::new(InMemoryKv::new());
        let dep = Deployment::new(
            "test".into(),
            "/html".into(),
            "docker".into(),
            "nginx:alpine".into(),
            Some(80),
        );
        registry.set(dep).unwrap();

        let found = registry.find("test", "/html/about").unwrap().unwrap();
        assert_eq!(found.path, "/html");

        let exact = registry.find("test", "/html").unwrap().unwrap();
        assert_eq!(exact.path, "/html");

        assert!(registry.find("test", "/other").unwrap().is_none());
    }

    #[test]
    fn path_prefixes_walks_from_longest_to_root() {
        assert_eq!(
            path_prefixes("/html/about"),
            vec!["/html/about".to_string(), "/html".to_string(), "/".to_string()]
        );
        assert_eq!(path_prefixes("/"), vec!["/".to_string()]);
    }
}
