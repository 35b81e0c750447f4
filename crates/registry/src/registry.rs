//! The per-dataset registry handle and its query trait.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, OnceCell};

use crate::batch::BatchProcess;
use crate::config::GitConfig;
use crate::error::RegistryError;

/// Where one remote reports a copy of some content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereisEntry {
    /// Remote UUID as recorded by the tracking system.
    pub uuid: String,
    /// Human-readable remote description.
    pub description: String,
    /// URLs explicitly registered for this content on this remote.
    pub urls: Vec<String>,
}

/// The two historical hash-bucketed object layouts for a content key.
///
/// Either may be in effect for a given dataset, so both are candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashPaths {
    /// Lowercase two-level bucketing, e.g. `annex/objects/f87/4d5/KEY/KEY`.
    pub lower: String,
    /// Mixed-case bucketing, e.g. `annex/objects/Fq/x1/KEY/KEY`.
    pub mixed: String,
}

/// Queries against one dataset's content-tracking metadata.
///
/// All methods may be expensive (they may shell out); callers must not
/// assume sub-millisecond latency and should memoize where safe.
#[async_trait]
pub trait AnnexQuery: Send + Sync {
    /// Whether a dataset-relative path is under content tracking.
    async fn is_tracked(&self, relpath: &str) -> Result<bool, RegistryError>;

    /// The content key for a tracked path, `None` if untracked.
    async fn content_key(&self, relpath: &str) -> Result<Option<String>, RegistryError>;

    /// Whether the content for a tracked path is present on local disk.
    async fn has_local_content(&self, relpath: &str) -> Result<bool, RegistryError>;

    /// Remote availability for a content key, in the registry's own order.
    async fn whereis(&self, key: &str) -> Result<Vec<WhereisEntry>, RegistryError>;

    /// Configured remote names, in configuration order.
    async fn remotes(&self) -> Result<Vec<String>, RegistryError>;

    /// The configured base URL for a remote, rewritten per any URL
    /// transformation rules. `None` if the remote has no URL.
    async fn remote_url(&self, name: &str) -> Result<Option<String>, RegistryError>;

    /// Hash-bucketed object paths for a key, one per bucketing scheme.
    async fn hash_paths(&self, key: &str) -> Result<HashPaths, RegistryError>;

    /// Release any batched-query resources. Safe to call multiple times.
    async fn shutdown(&self);
}

/// One row of `whereis --json` output.
#[derive(Debug, Deserialize)]
struct WhereisRow {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    whereis: Vec<WhereisRemoteRow>,
}

#[derive(Debug, Deserialize)]
struct WhereisRemoteRow {
    uuid: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    urls: Vec<String>,
}

const LOOKUPKEY: &str = "lookupkey";
const FIND: &str = "find";
const WHEREIS: &str = "whereis";
const EXAMINE_LOWER: &str = "examinekey-lower";
const EXAMINE_MIXED: &str = "examinekey-mixed";

/// Registry handle backed by long-lived `git annex … --batch` subprocesses.
///
/// One instance per dataset root. Batch children are spawned on first use
/// of each command and serialized individually, so concurrent callers
/// issuing different query kinds against the same root do not block each
/// other. [`GitAnnexRegistry::shutdown`] releases all children.
pub struct GitAnnexRegistry {
    root: PathBuf,
    query_timeout: Duration,
    batches: Mutex<HashMap<&'static str, Arc<BatchProcess>>>,
    config: OnceCell<GitConfig>,
}

impl GitAnnexRegistry {
    /// Create a handle for a dataset root. Nothing is spawned yet.
    ///
    /// # Arguments
    /// * `root` - Dataset root directory
    /// * `query_timeout` - Bound on each batch query
    pub fn new(root: impl Into<PathBuf>, query_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            query_timeout,
            batches: Mutex::new(HashMap::new()),
            config: OnceCell::new(),
        }
    }

    /// Dataset root this handle is bound to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn batch(&self, kind: &'static str) -> Arc<BatchProcess> {
        let mut batches = self.batches.lock().await;
        if let Some(batch) = batches.get(kind) {
            return Arc::clone(batch);
        }

        let (subcommand, args): (&str, Vec<String>) = match kind {
            LOOKUPKEY => ("lookupkey", vec!["--batch".to_string()]),
            FIND => ("find", vec!["--batch".to_string()]),
            WHEREIS => (
                "whereis",
                vec!["--batch-keys".to_string(), "--json".to_string()],
            ),
            EXAMINE_LOWER => (
                "examinekey",
                vec![
                    "--batch".to_string(),
                    "--format=annex/objects/${hashdirlower}${key}/${key}\n".to_string(),
                ],
            ),
            _ => (
                "examinekey",
                vec![
                    "--batch".to_string(),
                    "--format=annex/objects/${hashdirmixed}${key}/${key}\n".to_string(),
                ],
            ),
        };

        let batch: Arc<BatchProcess> = Arc::new(BatchProcess::new(
            &self.root,
            subcommand,
            args,
            self.query_timeout,
        ));
        batches.insert(kind, Arc::clone(&batch));
        batch
    }

    async fn config(&self) -> Result<&GitConfig, RegistryError> {
        self.config
            .get_or_try_init(|| GitConfig::load(&self.root))
            .await
    }
}

#[async_trait]
impl AnnexQuery for GitAnnexRegistry {
    async fn is_tracked(&self, relpath: &str) -> Result<bool, RegistryError> {
        Ok(self.content_key(relpath).await?.is_some())
    }

    async fn content_key(&self, relpath: &str) -> Result<Option<String>, RegistryError> {
        let line: String = self.batch(LOOKUPKEY).await.query(relpath).await?;
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }

    async fn has_local_content(&self, relpath: &str) -> Result<bool, RegistryError> {
        // `find --batch` echoes the path when content is present and prints
        // an empty line otherwise.
        let line: String = self.batch(FIND).await.query(relpath).await?;
        Ok(!line.is_empty())
    }

    async fn whereis(&self, key: &str) -> Result<Vec<WhereisEntry>, RegistryError> {
        let batch: Arc<BatchProcess> = self.batch(WHEREIS).await;
        let line: String = batch.query(key).await?;
        if line.is_empty() {
            return Ok(Vec::new());
        }

        let row: WhereisRow =
            serde_json::from_str(&line).map_err(|e| RegistryError::Malformed {
                command: batch.command_name(),
                message: e.to_string(),
            })?;

        if !row.success {
            return Ok(Vec::new());
        }

        Ok(row
            .whereis
            .into_iter()
            .map(|r: WhereisRemoteRow| WhereisEntry {
                uuid: r.uuid,
                description: r.description,
                urls: r.urls,
            })
            .collect())
    }

    async fn remotes(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.config().await?.remotes().to_vec())
    }

    async fn remote_url(&self, name: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.config().await?.remote_url(name))
    }

    async fn hash_paths(&self, key: &str) -> Result<HashPaths, RegistryError> {
        let lower: String = self.batch(EXAMINE_LOWER).await.query(key).await?;
        let mixed: String = self.batch(EXAMINE_MIXED).await.query(key).await?;
        Ok(HashPaths { lower, mixed })
    }

    async fn shutdown(&self) {
        let drained: Vec<Arc<BatchProcess>> = {
            let mut batches = self.batches.lock().await;
            batches.drain().map(|(_, batch)| batch).collect()
        };
        for batch in drained {
            batch.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whereis_row_parsing() {
        let line: &str = r#"{"key":"SHA256E-s5--abc","success":true,"whereis":[{"uuid":"u-1","description":"origin","urls":["https://example.org/data.bin"]},{"uuid":"u-2","description":"web","urls":[]}]}"#;
        let row: WhereisRow = serde_json::from_str(line).unwrap();
        assert!(row.success);
        assert_eq!(row.whereis.len(), 2);
        assert_eq!(row.whereis[0].urls, vec!["https://example.org/data.bin"]);
        assert_eq!(row.whereis[1].description, "web");
    }

    #[test]
    fn test_whereis_row_failure_tolerates_missing_fields() {
        let row: WhereisRow = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!row.success);
        assert!(row.whereis.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_idempotent() {
        let registry: GitAnnexRegistry =
            GitAnnexRegistry::new("/nonexistent", Duration::from_secs(1));
        registry.shutdown().await;
        registry.shutdown().await;
    }
}
