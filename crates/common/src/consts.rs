//! Tuning constants shared across the workspace.

/// Maximum number of memoized path -> dataset-root lookups.
pub const DEFAULT_LOCATION_CACHE_CAPACITY: usize = 1024;

/// Maximum number of memoized file-state classifications.
pub const DEFAULT_STATE_CACHE_CAPACITY: usize = 1024;

/// Best-effort staleness window for memoized classifications, in seconds.
pub const DEFAULT_STATE_CACHE_TTL_SECS: u64 = 60;

/// Non-symlink entries at or above this size skip the registry query and
/// classify as untracked. Annex placeholders are short pointer files, so a
/// small threshold avoids a subprocess round trip per large working file.
pub const DEFAULT_PLACEHOLDER_THRESHOLD: u64 = 1024;

/// Block size for the remote read cache (1 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// Per-query timeout for batched registry subprocess queries, in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Per-request timeout for remote fetches, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Cache store location relative to the adapter root.
pub const CACHE_SUBDIR: &str = ".git/annexfs/cache";
