//! Pure-lexical path helpers.
//!
//! None of these touch the filesystem. Symlinks are meaningful data in an
//! annexed tree, so callers classify them explicitly instead of letting
//! `canonicalize` collapse them away.

use std::path::{Component, Path, PathBuf};

/// Check whether `path` is lexically inside `root` (or equal to it).
///
/// # Arguments
/// * `path` - Path to test
/// * `root` - Containing root
pub fn is_within_root(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Lexically resolve a relative path from a base directory.
///
/// `..` pops a component, `.` is skipped. Does NOT access the filesystem.
///
/// # Arguments
/// * `base` - Base directory
/// * `relative` - Relative path to resolve
///
/// # Returns
/// Resolved absolute path.
pub fn lexical_resolve(base: &Path, relative: &Path) -> PathBuf {
    let mut result: PathBuf = base.to_path_buf();

    for component in relative.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => { /* skip */ }
            Component::Normal(name) => {
                result.push(name);
            }
            _ => {
                result.push(component);
            }
        }
    }

    result
}

/// Join `path` onto `base` and normalize lexically.
///
/// An absolute `path` replaces `base` entirely, matching `Path::join`
/// semantics, but the result is still normalized.
///
/// # Arguments
/// * `base` - Base directory for relative inputs
/// * `path` - Absolute or relative path
pub fn lexical_join(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        lexical_resolve(Path::new("/"), path.strip_prefix("/").unwrap_or(path))
    } else {
        lexical_resolve(base, path)
    }
}

/// Convert a path to a forward-slash string.
///
/// # Arguments
/// * `path` - Path to convert
pub fn to_posix_path(path: &Path) -> String {
    let s: String = path.to_string_lossy().to_string();
    if std::path::MAIN_SEPARATOR == '/' {
        s
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_within_root() {
        assert!(is_within_root(Path::new("/data/ds/file"), Path::new("/data")));
        assert!(is_within_root(Path::new("/data"), Path::new("/data")));
        assert!(!is_within_root(Path::new("/other/file"), Path::new("/data")));
    }

    #[test]
    fn test_lexical_resolve_simple() {
        let resolved: PathBuf =
            lexical_resolve(Path::new("/ds/sub"), Path::new("textures/wood.png"));
        assert_eq!(resolved, PathBuf::from("/ds/sub/textures/wood.png"));
    }

    #[test]
    fn test_lexical_resolve_with_dotdot() {
        let resolved: PathBuf = lexical_resolve(
            Path::new("/ds/sub/models"),
            Path::new("../.git/annex/objects/aa/bb/KEY/KEY"),
        );
        assert_eq!(
            resolved,
            PathBuf::from("/ds/sub/.git/annex/objects/aa/bb/KEY/KEY")
        );
    }

    #[test]
    fn test_lexical_resolve_with_dot() {
        let resolved: PathBuf = lexical_resolve(Path::new("/ds"), Path::new("./a/./b"));
        assert_eq!(resolved, PathBuf::from("/ds/a/b"));
    }

    #[test]
    fn test_lexical_join_relative() {
        assert_eq!(
            lexical_join(Path::new("/top"), Path::new("ds/data.bin")),
            PathBuf::from("/top/ds/data.bin")
        );
    }

    #[test]
    fn test_lexical_join_absolute_wins() {
        assert_eq!(
            lexical_join(Path::new("/top"), Path::new("/elsewhere/x")),
            PathBuf::from("/elsewhere/x")
        );
    }

    #[test]
    fn test_lexical_join_normalizes_dotdot() {
        assert_eq!(
            lexical_join(Path::new("/top"), Path::new("ds/../other/f")),
            PathBuf::from("/top/other/f")
        );
    }
}
