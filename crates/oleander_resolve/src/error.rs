//! Error types for dependency resolution.

/// Errors that can occur while loading resolution metadata.
///
/// Resolution itself never fails: unknown modules are treated as leaves.
/// Only malformed metadata is an error.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The manifest document is not valid JSON of the expected shape.
    #[error("failed to parse dependency manifest: {reason}")]
    ManifestParse {
        /// Description of the parse failure.
        reason: String,
    },
}
