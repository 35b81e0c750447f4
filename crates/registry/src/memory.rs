//! In-memory registry for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::registry::{AnnexQuery, HashPaths, WhereisEntry};

#[derive(Debug, Clone)]
struct MemoryFile {
    key: String,
    present: bool,
}

/// In-memory [`AnnexQuery`] implementation for tests and embedders.
///
/// Tracks every query in a counter so tests can assert that code paths
/// which must avoid the registry really do.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    files: RwLock<HashMap<String, MemoryFile>>,
    whereis: RwLock<HashMap<String, Vec<WhereisEntry>>>,
    remotes: RwLock<Vec<(String, Option<String>)>>,
    hash_paths: RwLock<HashMap<String, HashPaths>>,
    query_count: AtomicU64,
}

impl MemoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tracked file.
    ///
    /// # Arguments
    /// * `relpath` - Dataset-relative path
    /// * `key` - Content key
    /// * `present` - Whether local content exists
    pub fn insert_file(&self, relpath: impl Into<String>, key: impl Into<String>, present: bool) {
        self.files.write().unwrap().insert(
            relpath.into(),
            MemoryFile {
                key: key.into(),
                present,
            },
        );
    }

    /// Record whereis output for a key.
    ///
    /// # Arguments
    /// * `key` - Content key
    /// * `entries` - Remote availability entries, in reported order
    pub fn insert_whereis(&self, key: impl Into<String>, entries: Vec<WhereisEntry>) {
        self.whereis.write().unwrap().insert(key.into(), entries);
    }

    /// Record a configured remote.
    ///
    /// # Arguments
    /// * `name` - Remote name
    /// * `url` - Rewritten base URL, if any
    pub fn insert_remote(&self, name: impl Into<String>, url: Option<&str>) {
        self.remotes
            .write()
            .unwrap()
            .push((name.into(), url.map(str::to_string)));
    }

    /// Record hash-bucketed paths for a key.
    ///
    /// # Arguments
    /// * `key` - Content key
    /// * `lower` - Lowercase-bucketing path
    /// * `mixed` - Mixed-bucketing path
    pub fn insert_hash_paths(&self, key: impl Into<String>, lower: &str, mixed: &str) {
        self.hash_paths.write().unwrap().insert(
            key.into(),
            HashPaths {
                lower: lower.to_string(),
                mixed: mixed.to_string(),
            },
        );
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    fn bump(&self) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl AnnexQuery for MemoryRegistry {
    async fn is_tracked(&self, relpath: &str) -> Result<bool, RegistryError> {
        self.bump();
        Ok(self.files.read().unwrap().contains_key(relpath))
    }

    async fn content_key(&self, relpath: &str) -> Result<Option<String>, RegistryError> {
        self.bump();
        Ok(self
            .files
            .read()
            .unwrap()
            .get(relpath)
            .map(|f: &MemoryFile| f.key.clone()))
    }

    async fn has_local_content(&self, relpath: &str) -> Result<bool, RegistryError> {
        self.bump();
        Ok(self
            .files
            .read()
            .unwrap()
            .get(relpath)
            .map(|f: &MemoryFile| f.present)
            .unwrap_or(false))
    }

    async fn whereis(&self, key: &str) -> Result<Vec<WhereisEntry>, RegistryError> {
        self.bump();
        Ok(self
            .whereis
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn remotes(&self) -> Result<Vec<String>, RegistryError> {
        self.bump();
        Ok(self
            .remotes
            .read()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn remote_url(&self, name: &str) -> Result<Option<String>, RegistryError> {
        self.bump();
        Ok(self
            .remotes
            .read()
            .unwrap()
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, url)| url.clone()))
    }

    async fn hash_paths(&self, key: &str) -> Result<HashPaths, RegistryError> {
        self.bump();
        self.hash_paths
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::Malformed {
                command: "memory examinekey".to_string(),
                message: format!("no hash paths recorded for key {}", key),
            })
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_registry_file_queries() {
        let registry: MemoryRegistry = MemoryRegistry::new();
        registry.insert_file("data.bin", "KEY-1", false);

        assert!(registry.is_tracked("data.bin").await.unwrap());
        assert!(!registry.is_tracked("other.bin").await.unwrap());
        assert_eq!(
            registry.content_key("data.bin").await.unwrap().as_deref(),
            Some("KEY-1")
        );
        assert!(!registry.has_local_content("data.bin").await.unwrap());
        assert_eq!(registry.query_count(), 4);
    }

    #[tokio::test]
    async fn test_memory_registry_remotes() {
        let registry: MemoryRegistry = MemoryRegistry::new();
        registry.insert_remote("origin", Some("https://example.org/ds/.git"));
        registry.insert_remote("offline", None);

        assert_eq!(registry.remotes().await.unwrap(), vec!["origin", "offline"]);
        assert_eq!(
            registry.remote_url("origin").await.unwrap().as_deref(),
            Some("https://example.org/ds/.git")
        );
        assert_eq!(registry.remote_url("offline").await.unwrap(), None);
    }
}
