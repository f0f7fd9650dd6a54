//! Error types for dispatch operations.

use thiserror::Error;

/// Errors produced by dispatch components.
///
/// A region turning a job away is not an error; see
/// [`Rejection`](crate::core::Rejection).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The caller named a region the dispatcher was not configured with.
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    /// The job was interrupted while waiting for a worker or during a timed phase.
    #[error("job cancelled")]
    Cancelled,
    /// The worker pool is already holding `capacity` idle workers.
    #[error("worker pool full (capacity {capacity})")]
    PoolOverflow {
        /// Configured pool capacity.
        capacity: usize,
    },
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A region executor thread could not be started.
    #[error("failed to spawn executor thread: {0}")]
    Spawn(String),
    /// Waiting on a job handle timed out.
    #[error("operation timed out")]
    Timeout,
    /// The job result was already taken from its handle.
    #[error("job result already consumed")]
    ResultConsumed,
    /// The task went away without producing an outcome.
    #[error("job task disconnected before completion")]
    Disconnected,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
