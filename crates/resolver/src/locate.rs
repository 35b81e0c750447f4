//! Dataset location: map a path to its nearest enclosing dataset root.

use std::path::{Path, PathBuf};

use annexfs_common::is_within_root;

use crate::error::ResolveError;

/// Find the nearest enclosing dataset root for an absolute path.
///
/// A dataset root is any ancestor carrying a `.git` entry (directory, or
/// file for worktree/submodule layouts). The walk is purely lexical; the
/// path itself need not exist yet.
///
/// Paths that do not change their owning dataset root at runtime is an
/// explicit non-goal here: callers memoize results for the process
/// lifetime.
///
/// # Arguments
/// * `top_root` - Configured top-level root all datasets must live under
/// * `path` - Absolute, lexically normalized path to locate
///
/// # Errors
/// - `OutsideRoot` if `path` (or the discovered root) is not under
///   `top_root`
/// - `NotTracked` if no ancestor is a dataset root
pub fn find_dataset_root(top_root: &Path, path: &Path) -> Result<PathBuf, ResolveError> {
    if !is_within_root(path, top_root) {
        return Err(ResolveError::OutsideRoot {
            path: path.display().to_string(),
            root: top_root.display().to_string(),
        });
    }

    for ancestor in path.ancestors() {
        if ancestor.join(".git").exists() {
            if !is_within_root(ancestor, top_root) {
                return Err(ResolveError::OutsideRoot {
                    path: path.display().to_string(),
                    root: top_root.display().to_string(),
                });
            }
            return Ok(ancestor.to_path_buf());
        }
    }

    Err(ResolveError::NotTracked {
        path: path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finds_nearest_root() {
        let dir: TempDir = TempDir::new().unwrap();
        let top: &Path = dir.path();
        std::fs::create_dir_all(top.join(".git")).unwrap();
        std::fs::create_dir_all(top.join("sub/.git")).unwrap();
        std::fs::create_dir_all(top.join("sub/deep")).unwrap();

        let root: PathBuf = find_dataset_root(top, &top.join("sub/deep/file.bin")).unwrap();
        assert_eq!(root, top.join("sub"));

        let root: PathBuf = find_dataset_root(top, &top.join("other.bin")).unwrap();
        assert_eq!(root, top);
    }

    #[test]
    fn test_git_file_counts_as_root() {
        let dir: TempDir = TempDir::new().unwrap();
        let top: &Path = dir.path();
        std::fs::create_dir_all(top.join("ds")).unwrap();
        std::fs::write(top.join("ds/.git"), "gitdir: ../.git/modules/ds\n").unwrap();

        let root: PathBuf = find_dataset_root(top, &top.join("ds/data.bin")).unwrap();
        assert_eq!(root, top.join("ds"));
    }

    #[test]
    fn test_outside_root_rejected_before_walk() {
        let dir: TempDir = TempDir::new().unwrap();
        let result = find_dataset_root(dir.path(), Path::new("/definitely/elsewhere"));
        assert!(matches!(result, Err(ResolveError::OutsideRoot { .. })));
    }

    #[test]
    fn test_root_above_top_root_rejected() {
        let dir: TempDir = TempDir::new().unwrap();
        let top: &Path = dir.path();
        // Repository above the configured root, nothing inside it.
        std::fs::create_dir_all(top.join(".git")).unwrap();
        std::fs::create_dir_all(top.join("inner/data")).unwrap();

        // Configured root is `inner`; the only discoverable repository is
        // the one above it.
        let result = find_dataset_root(&top.join("inner"), &top.join("inner/data/f.bin"));
        assert!(matches!(result, Err(ResolveError::OutsideRoot { .. })));
    }

    #[test]
    fn test_no_dataset_found() {
        let dir: TempDir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("plain")).unwrap();

        let result = find_dataset_root(dir.path(), &dir.path().join("plain/file.txt"));
        assert!(matches!(result, Err(ResolveError::NotTracked { .. })));
    }
}
