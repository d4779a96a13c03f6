//! Error types for sandbox execution.

use std::time::Duration;

use oleander_loader::LoaderError;

/// Failures of one sandbox exchange.
///
/// Every variant ends the run; the caller retries with a fresh sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The exchange did not finish in time.
    #[error("sandbox timed out after {}s", after.as_secs_f64())]
    Timeout {
        /// The configured limit.
        after: Duration,
    },

    /// The sandbox sent an `error` event.
    #[error("sandbox error: {0}")]
    Reported(String),

    /// The sandbox went away before sending `done`.
    #[error("sandbox closed the channel before finishing")]
    Closed,

    /// The sandbox sent an event out of order.
    #[error("expected '{expected}' from sandbox, got '{got}'")]
    Protocol {
        /// The event the host was waiting for.
        expected: &'static str,
        /// The event that arrived.
        got: String,
    },

    /// A message could not be encoded or decoded.
    #[error("malformed sandbox message: {0}")]
    Malformed(String),

    /// A sandbox instance could not be started.
    #[error("failed to start sandbox: {0}")]
    Spawn(String),
}

/// Failures of [`Runner::run`](crate::runner::Runner::run).
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Staging the library failed.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// Executing the program failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
