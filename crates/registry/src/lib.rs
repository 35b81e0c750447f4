//! Batched registry queries against a dataset's content-tracking metadata.
//!
//! One [`GitAnnexRegistry`] is created per dataset root and retained for the
//! adapter's lifetime. Queries go through long-lived `git annex … --batch`
//! subprocesses (one per command, spawned on first use) so that repeated
//! lookups do not pay a process startup per call. All queries may be slow;
//! callers memoize where safe.
//!
//! The [`AnnexQuery`] trait is the seam for alternative backends.
//! [`MemoryRegistry`] is a fully in-memory implementation for tests and
//! embedders.

mod batch;
mod config;
mod error;
mod memory;
mod registry;

pub use batch::BatchProcess;
pub use config::GitConfig;
pub use error::RegistryError;
pub use memory::MemoryRegistry;
pub use registry::{AnnexQuery, GitAnnexRegistry, HashPaths, WhereisEntry};
