//! Error types for registry queries.

use thiserror::Error;

/// Errors that can occur while querying the tracking-system registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to spawn a batch subprocess.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        /// The command that failed to start.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// IO failure talking to a batch subprocess.
    #[error("IO error on `{command}` batch stream: {source}")]
    Io {
        /// The batch command.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A batch subprocess closed its output stream.
    #[error("Batch subprocess `{command}` exited unexpectedly")]
    Closed {
        /// The batch command.
        command: String,
    },

    /// A batch query exceeded its timeout.
    #[error("Query on `{command}` timed out after {secs}s")]
    Timeout {
        /// The batch command.
        command: String,
        /// The timeout that elapsed, in seconds.
        secs: u64,
    },

    /// Unparseable output from a batch subprocess.
    #[error("Malformed `{command}` output: {message}")]
    Malformed {
        /// The batch command.
        command: String,
        /// What went wrong while parsing.
        message: String,
    },

    /// A one-shot git command exited with a failure status.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}
