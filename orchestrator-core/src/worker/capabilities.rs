//! Capability records advertised by a worker on `ready` (spec.md §3).

use serde::{Deserialize, Serialize};

pub const RESERVED_NAMESPACE: &str = "zerverless";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub js: bool,
    #[serde(default)]
    pub lua: bool,
    #[serde(default)]
    pub python: bool,
    #[serde(default)]
    pub wasm: bool,
    #[serde(default)]
    pub docker: bool,
    /// Namespaces this worker is restricted to. Empty means "any namespace".
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl Capabilities {
    /// Maps a raw job-type tag onto the runtime family it belongs to, per the
    /// table in spec.md §3. Any tag outside this table is unsupported.
    fn runtime_family(job_type: &str) -> Option<&'static str> {
        match job_type {
            "js" | "javascript" => Some("js"),
            "lua" => Some("lua"),
            "python" | "py" => Some("python"),
            "wasm" | "" => Some("wasm"),
            "docker" | "docker-run" | "docker-build" | "docker-deploy" | "docker-build-deploy" => {
                Some("docker")
            }
            _ => None,
        }
    }

    pub fn supports(&self, job_type: &str) -> bool {
        match Self::runtime_family(job_type) {
            Some("js") => self.js,
            Some("lua") => self.lua,
            Some("python") => self.python,
            Some("wasm") => self.wasm,
            Some("docker") => self.docker,
            _ => false,
        }
    }

    pub fn supports_namespace(&self, namespace: &str) -> bool {
        namespace == RESERVED_NAMESPACE
            || self.namespaces.is_empty()
            || self.namespaces.iter().any(|ns| ns == namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_aliases_onto_runtime_families() {
        let caps = Capabilities {
            js: true,
            python: true,
            docker: true,
            ..Default::default()
        };
        assert!(caps.supports("javascript"));
        assert!(caps.supports("js"));
        assert!(caps.supports("py"));
        assert!(caps.supports("python"));
        assert!(caps.supports("docker-build-deploy"));
        assert!(!caps.supports("lua"));
        assert!(!caps.supports("ruby"));
    }

    #[test]
    fn empty_job_type_maps_to_wasm() {
        let caps = Capabilities {
            wasm: true,
            ..Default::default()
        };
        assert!(caps.supports(""));
        assert!(caps.supports("wasm"));
    }

    #[test]
    fn namespace_rules() {
        let open = Capabilities::default();
        assert!(open.supports_namespace("alice"));
        assert!(open.supports_namespace(RESERVED_NAMESPACE));

        let restricted = Capabilities {
            namespaces: vec!["bob".to_string()],
            ..Default::default()
        };
        assert!(restricted.supports_namespace("bob"));
        assert!(restricted.supports_namespace(RESERVED_NAMESPACE));
        assert!(!restricted.supports_namespace("alice"));
    }
}
