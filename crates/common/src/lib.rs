//! Shared path utilities and tuning constants for the annexfs workspace.

mod consts;
mod paths;

pub use consts::{
    DEFAULT_BLOCK_SIZE, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_LOCATION_CACHE_CAPACITY,
    DEFAULT_PLACEHOLDER_THRESHOLD, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_STATE_CACHE_CAPACITY,
    DEFAULT_STATE_CACHE_TTL_SECS, CACHE_SUBDIR,
};
pub use paths::{is_within_root, lexical_join, lexical_resolve, to_posix_path};
