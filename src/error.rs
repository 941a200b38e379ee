//! Error types for workpool.
//!
//! These cover engine lifecycle and configuration misuse only. A job's own
//! failure never surfaces here; it reaches the submitter through the job's
//! `on_failure` callback and a `false` completion.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("engine is not running")]
    NotRunning,

    #[error("engine cancellation token was triggered")]
    Cancelled,

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
