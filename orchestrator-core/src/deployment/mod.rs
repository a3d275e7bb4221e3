//! Deployment records (spec.md §3) and their registry (§4.7).

pub mod registry;

pub use registry::DeploymentRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Deployment {
    pub user: String,
    /// Always begins with `/`.
    pub path: String,
    pub runtime: String,
    /// Inline source for script runtimes, image tag for `docker`.
    pub code: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub created_at: DateTime<Utc>,
}

impl Deployment {
    pub fn new(user: String, path: String, runtime: String, code: String, port: Option<u16>) -> Self {
        Self {
            user,
            path,
            runtime,
            code,
            port,
            created_at: Utc::now(),
        }
    }

    /// `user + path`, the unique identifier of a docker deployment's
    /// container (spec.md GLOSSARY "Container key").
    pub fn key(&self) -> String {
        format!("{}{}", self.user, self.path)
    }

    pub fn key_for(user: &str, path: &str) -> String {
        format!("{user}{path}")
    }
}
