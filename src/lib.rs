//! # workpool
//!
//! A fixed-size pool of worker threads fed by a single dispatcher.
//!
//! Callers submit [`Job`]s to an [`Engine`] and get back a
//! [`CompletionHandle`] that resolves exactly once to the job's outcome.
//! Idle workers offer themselves through a zero-capacity ready registry and
//! the dispatcher hands each job directly to one of them, so there is no
//! internal job queue.

pub mod cancel;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod telemetry;

pub use cancel::CancelToken;
pub use completion::CompletionHandle;
pub use engine::{Engine, Lifecycle};
pub use error::{Error, Result};
pub use job::{AlreadyCompleted, Job, JobId};
