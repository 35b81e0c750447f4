//! File state classification: untracked, tracked-absent, tracked-present.

use std::path::{Path, PathBuf};

use annexfs_common::{is_within_root, lexical_resolve};
use annexfs_registry::AnnexQuery;

use crate::error::ResolveError;

/// Object storage area inside a dataset, relative to its root.
const OBJECTS_DIR: [&str; 3] = [".git", "annex", "objects"];

/// Classification of one path at lookup time.
///
/// A pure function of path + filesystem snapshot; tracked states carry the
/// content key shared by all paths pointing at identical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    /// The path is outside the tracked-content system.
    NotTracked,
    /// Under tracking, but the bytes are not on local disk.
    TrackedAbsent {
        /// Content key for the absent bytes.
        key: String,
    },
    /// Under tracking with bytes present on local disk.
    TrackedPresent {
        /// Content key for the local bytes.
        key: String,
    },
}

impl FileState {
    /// The content key, for either tracked state.
    pub fn key(&self) -> Option<&str> {
        match self {
            FileState::NotTracked => None,
            FileState::TrackedAbsent { key } | FileState::TrackedPresent { key } => Some(key),
        }
    }

    /// Whether the path is under content tracking.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, FileState::NotTracked)
    }

    /// Whether bytes are available on local disk without a fetch.
    pub fn has_local_content(&self) -> bool {
        matches!(self, FileState::TrackedPresent { .. })
    }
}

/// Classify a dataset-relative path.
///
/// Non-symlink entries below `placeholder_threshold` bytes are treated as
/// possible not-yet-fetched placeholders and checked against the registry;
/// entries at or above the threshold skip the registry and classify as
/// untracked. That shortcut misclassifies a tracked file whose placeholder
/// exceeds the threshold, which is why the threshold is tunable.
///
/// Symlink entries never consult the registry: a target inside the
/// dataset's object storage names the content key in its final segment,
/// and on-disk existence of the target decides present vs absent.
///
/// # Arguments
/// * `registry` - Registry handle for this dataset
/// * `root` - Dataset root
/// * `relpath` - Dataset-relative path, forward slashes
/// * `placeholder_threshold` - Size bound for the placeholder heuristic
pub async fn classify(
    registry: &dyn AnnexQuery,
    root: &Path,
    relpath: &str,
    placeholder_threshold: u64,
) -> Result<FileState, ResolveError> {
    let abs: PathBuf = root.join(relpath);
    let meta = std::fs::symlink_metadata(&abs)
        .map_err(|source| ResolveError::io(abs.display().to_string(), source))?;

    if !meta.file_type().is_symlink() {
        if meta.len() < placeholder_threshold {
            if let Some(key) = registry.content_key(relpath).await? {
                if registry.has_local_content(relpath).await? {
                    return Ok(FileState::TrackedPresent { key });
                }
                return Ok(FileState::TrackedAbsent { key });
            }
        }
        return Ok(FileState::NotTracked);
    }

    let target: PathBuf = std::fs::read_link(&abs)
        .map_err(|source| ResolveError::io(abs.display().to_string(), source))?;
    let link_dir: &Path = abs.parent().unwrap_or(root);
    let resolved: PathBuf = if target.is_absolute() {
        target
    } else {
        lexical_resolve(link_dir, &target)
    };

    let mut objects: PathBuf = root.to_path_buf();
    for segment in OBJECTS_DIR {
        objects.push(segment);
    }
    if !is_within_root(&resolved, &objects) {
        return Ok(FileState::NotTracked);
    }

    let key: String = match resolved.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => return Ok(FileState::NotTracked),
    };

    if resolved.exists() {
        Ok(FileState::TrackedPresent { key })
    } else {
        Ok(FileState::TrackedAbsent { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annexfs_registry::MemoryRegistry;
    use tempfile::TempDir;

    fn make_dataset() -> TempDir {
        let dir: TempDir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/annex/objects")).unwrap();
        dir
    }

    fn add_object(root: &Path, key: &str, data: Option<&[u8]>) -> PathBuf {
        let object_dir: PathBuf = root.join(".git/annex/objects/xx/yy").join(key);
        if let Some(data) = data {
            std::fs::create_dir_all(&object_dir).unwrap();
            std::fs::write(object_dir.join(key), data).unwrap();
        }
        object_dir.join(key)
    }

    #[cfg(unix)]
    fn link(root: &Path, relpath: &str, target: &Path) {
        let abs: PathBuf = root.join(relpath);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let rel_target: PathBuf = pathdiff(target, abs.parent().unwrap());
        std::os::unix::fs::symlink(rel_target, abs).unwrap();
    }

    // Minimal relative-path computation for fixtures: walk up from `from`
    // until it prefixes `to`.
    #[cfg(unix)]
    fn pathdiff(to: &Path, from: &Path) -> PathBuf {
        let mut ups: PathBuf = PathBuf::new();
        let mut base: &Path = from;
        loop {
            if let Ok(rest) = to.strip_prefix(base) {
                return ups.join(rest);
            }
            base = base.parent().unwrap();
            ups.push("..");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_to_missing_object_is_tracked_absent() {
        let dir: TempDir = make_dataset();
        let target: PathBuf = add_object(dir.path(), "abc123", None);
        link(dir.path(), "data.bin", &target);

        let registry: MemoryRegistry = MemoryRegistry::new();
        let state: FileState = classify(&registry, dir.path(), "data.bin", 1024)
            .await
            .unwrap();

        assert_eq!(
            state,
            FileState::TrackedAbsent {
                key: "abc123".to_string()
            }
        );
        // Symlink classification never needs the registry.
        assert_eq!(registry.query_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_to_existing_object_is_tracked_present() {
        let dir: TempDir = make_dataset();
        let target: PathBuf = add_object(dir.path(), "abc123", Some(b"hello"));
        link(dir.path(), "data.bin", &target);

        let registry: MemoryRegistry = MemoryRegistry::new();
        let state: FileState = classify(&registry, dir.path(), "data.bin", 1024)
            .await
            .unwrap();

        assert_eq!(
            state,
            FileState::TrackedPresent {
                key: "abc123".to_string()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_object_store_is_not_tracked() {
        let dir: TempDir = make_dataset();
        std::fs::write(dir.path().join("real.txt"), b"plain").unwrap();
        link(dir.path(), "alias.txt", &dir.path().join("real.txt"));

        let registry: MemoryRegistry = MemoryRegistry::new();
        let state: FileState = classify(&registry, dir.path(), "alias.txt", 1024)
            .await
            .unwrap();

        assert_eq!(state, FileState::NotTracked);
    }

    #[tokio::test]
    async fn test_small_unlocked_file_queries_registry() {
        let dir: TempDir = make_dataset();
        std::fs::write(dir.path().join("pointer.bin"), b"tiny").unwrap();

        let registry: MemoryRegistry = MemoryRegistry::new();
        registry.insert_file("pointer.bin", "KEY-9", false);

        let state: FileState = classify(&registry, dir.path(), "pointer.bin", 1024)
            .await
            .unwrap();

        assert_eq!(
            state,
            FileState::TrackedAbsent {
                key: "KEY-9".to_string()
            }
        );
        assert!(registry.query_count() > 0);
    }

    #[tokio::test]
    async fn test_large_file_skips_registry() {
        let dir: TempDir = make_dataset();
        let big: Vec<u8> = vec![0u8; 4096];
        std::fs::write(dir.path().join("large.bin"), &big).unwrap();

        let registry: MemoryRegistry = MemoryRegistry::new();
        // Even if the registry would claim it, the size gate wins.
        registry.insert_file("large.bin", "KEY-BIG", false);

        let state: FileState = classify(&registry, dir.path(), "large.bin", 1024)
            .await
            .unwrap();

        assert_eq!(state, FileState::NotTracked);
        assert_eq!(registry.query_count(), 0);
    }

    #[tokio::test]
    async fn test_small_untracked_file_is_not_tracked() {
        let dir: TempDir = make_dataset();
        std::fs::write(dir.path().join("notes.txt"), b"plain").unwrap();

        let registry: MemoryRegistry = MemoryRegistry::new();
        let state: FileState = classify(&registry, dir.path(), "notes.txt", 1024)
            .await
            .unwrap();

        assert_eq!(state, FileState::NotTracked);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_classify_is_idempotent() {
        let dir: TempDir = make_dataset();
        let target: PathBuf = add_object(dir.path(), "abc123", None);
        link(dir.path(), "data.bin", &target);

        let registry: MemoryRegistry = MemoryRegistry::new();
        let first: FileState = classify(&registry, dir.path(), "data.bin", 1024)
            .await
            .unwrap();
        let second: FileState = classify(&registry, dir.path(), "data.bin", 1024)
            .await
            .unwrap();

        assert_eq!(first, second);
    }
}
