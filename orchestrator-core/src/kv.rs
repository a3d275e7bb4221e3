//! Key/value persistence abstraction.
//!
//! spec.md §4.2 and §9 require the job store (and, by extension, the
//! deployment registry) to come in two flavours with identical semantics: an
//! in-memory one and a durable one keyed by `jobs/<id>` / `deployments/<user>/<path>`
//! prefixes (spec.md §6). `KvStore` is the narrow contract both backends
//! implement; callers never branch on which one is wired in.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

/// Minimal ordered key/value contract. Keys are compared byte-wise, so prefix
/// scans return results in lexicographic (and therefore stable) order.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    /// Returns every `(key, value)` pair whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// In-memory backend. Used when no `--kv-path` is configured and in tests.
#[derive(Default)]
pub struct InMemoryKv {
    inner: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryKv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl KvStore for InMemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .inner
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// `sled`-backed embedded durable store. One `sled::Db` per orchestrator
/// instance, opened at `kv_path`.
pub struct SledKv {
    db: sled::Db,
}

impl SledKv {
    pub fn open(path: &str) -> Result<Arc<Self>> {
        let db = sled::open(path).with_context(|| format!("opening sled db at {path}"))?;
        Ok(Arc::new(Self { db }))
    }
}

impl KvStore for SledKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db.remove(key)?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.db
            .scan_prefix(prefix)
            .map(|entry| {
                let (k, v) = entry?;
                Ok((String::from_utf8_lossy(&k).into_owned(), v.to_vec()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_prefix_scan_is_ordered_and_isolated() {
        let kv = InMemoryKv::new();
        kv.put("jobs/1", b"a").unwrap();
        kv.put("jobs/2", b"b").unwrap();
        kv.put("deployments/u/p", b"c").unwrap();

        let jobs = kv.scan_prefix("jobs/").unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].0, "jobs/1");
        assert_eq!(jobs[1].0, "jobs/2");

        kv.delete("jobs/1").unwrap();
        assert!(kv.get("jobs/1").unwrap().is_none());
        assert_eq!(kv.scan_prefix("jobs/").unwrap().len(), 1);
    }
}
