//! Error types for remote fetching and caching.

use thiserror::Error;

/// Failure of a single remote fetch attempt.
///
/// These are per-candidate: the dispatcher logs them at debug level and
/// advances to the next candidate URL rather than failing the open.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote reports no object at this URL.
    #[error("Remote object not found: {url}")]
    NotFound {
        /// The URL that was tried.
        url: String,
    },

    /// The remote answered with an unexpected status.
    #[error("Remote returned status {status} for {url}")]
    Status {
        /// The URL that was tried.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The request failed at the transport level.
    #[error("Request to {url} failed: {source}")]
    Network {
        /// The URL that was tried.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded its timeout; retryable on the next candidate.
    #[error("Request to {url} timed out")]
    Timeout {
        /// The URL that was tried.
        url: String,
    },

    /// The response could not be interpreted (missing length, short body).
    #[error("Malformed response from {url}: {message}")]
    Malformed {
        /// The URL that was tried.
        url: String,
        /// What was wrong with the response.
        message: String,
    },

    /// The HTTP client itself could not be constructed.
    #[error("HTTP client construction failed: {source}")]
    Client {
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Whether this failure means the object does not exist at the URL.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Failure in the caching read layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO failure on the cache directory.
    #[error("Cache IO error at {path}: {source}")]
    Io {
        /// Cache path where the error occurred.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The fetch behind a cache miss failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl CacheError {
    /// Create an `Io` error for a cache path.
    ///
    /// # Arguments
    /// * `path` - Cache path where the error occurred
    /// * `source` - The underlying IO error
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
