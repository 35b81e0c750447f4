//! Error types for the resolver crate.

use annexfs_registry::RegistryError;
use thiserror::Error;

use crate::remote::CacheError;

/// Errors surfaced by [`crate::FsAdapter`] operations.
///
/// Per-candidate fetch failures are not represented here: the dispatcher
/// swallows them, logs at debug level, and advances to the next candidate.
/// None of these are process-fatal; a failed open of one file never affects
/// concurrent operations on other files.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The path escapes the configured top-level root.
    #[error("Path is outside root: {path} not in {root}")]
    OutsideRoot {
        /// The offending path.
        path: String,
        /// The configured top-level root.
        root: String,
    },

    /// No enclosing dataset was found for the path.
    #[error("No enclosing dataset for path: {path}")]
    NotTracked {
        /// The offending path.
        path: String,
    },

    /// A write or otherwise unsupported open mode was requested.
    #[error("Unsupported open mode: {mode:?} (only \"r\", \"rb\", \"rt\")")]
    UnsupportedMode {
        /// The rejected mode string.
        mode: String,
    },

    /// Text mode was requested with an encoding this build cannot decode.
    #[error("Unsupported text encoding: {encoding:?}")]
    UnsupportedEncoding {
        /// The rejected encoding name.
        encoding: String,
    },

    /// Every candidate URL was exhausted without a successful open.
    #[error("No usable source for {path} after {} candidate URL(s)", .attempted.len())]
    NoUsableSource {
        /// The path that could not be resolved.
        path: String,
        /// Every URL that was attempted, in order.
        attempted: Vec<String>,
    },

    /// Text decoding failed on a strict-mode read.
    #[error("Content of {path} is not valid text")]
    Decode {
        /// The path whose content failed to decode.
        path: String,
    },

    /// Registry query failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Cache-layer failure during a read.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Local filesystem failure.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    /// Create an `Io` error for a path.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `source` - The underlying IO error
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
