//! Error types for artifact loading.

use std::time::Duration;

use oleander_archive::ArchiveError;
use oleander_config::ConfigError;

/// Errors raised by a [`Transport`](crate::transport::Transport).
///
/// A plain "not found" is not an error; transports report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success, non-404 status.
    #[error("{location}: HTTP status {status}")]
    Status {
        /// The requested location.
        location: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request failed before a response arrived.
    #[error("{location}: {reason}")]
    Network {
        /// The requested location.
        location: String,
        /// Description of the failure.
        reason: String,
    },

    /// A local file could not be read.
    #[error("{location}: {source}")]
    Io {
        /// The requested location.
        location: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The path escapes the content root or is otherwise unusable.
    #[error("invalid artifact path '{path}'")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },
}

/// Hard failures of the loading pipeline.
///
/// Missing or invalid artifacts are not errors; they are logged and counted
/// in [`FetchReport`](crate::fetch::FetchReport). Only unavailable metadata
/// and timeouts stop a load.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The dependency manifest could not be fetched or parsed.
    #[error("dependency manifest unavailable at {location}: {reason}")]
    ManifestUnavailable {
        /// Where the manifest was requested from.
        location: String,
        /// Description of the failure.
        reason: String,
    },

    /// The flat file listing could not be fetched or parsed.
    #[error("file listing unavailable at {location}: {reason}")]
    ListingUnavailable {
        /// Where the listing was requested from.
        location: String,
        /// Description of the failure.
        reason: String,
    },

    /// The bulk archive could not be fetched.
    #[error("bulk archive unavailable at {location}: {reason}")]
    ArchiveUnavailable {
        /// Where the archive was requested from.
        location: String,
        /// Description of the failure.
        reason: String,
    },

    /// The bulk archive was fetched but could not be decoded.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The project configuration cannot drive a session.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A fetch batch did not finish in time.
    #[error("fetch batch timed out after {}s", after.as_secs_f64())]
    Timeout {
        /// The configured batch limit.
        after: Duration,
    },
}
