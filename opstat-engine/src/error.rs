//! Error types for the engine.

use thiserror::Error;

/// Errors returned by the engine's setup and submission APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown log severity name.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    /// Malformed setup parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An observation was submitted without an operation name.
    #[error("observation has an empty operation name")]
    EmptyOperation,

    /// The aggregator has stopped and no longer accepts samples or requests.
    #[error("aggregator has stopped")]
    Closed,

    /// The aggregator task ended abnormally.
    #[error("aggregator task failed: {0}")]
    TaskFailed(String),

    /// Writing a report to an output failed.
    #[error("output I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
