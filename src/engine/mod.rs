//! Worker-pool engine: dispatcher lifecycle, workers, and the ready registry
//! that connects them.

pub mod dispatcher;
mod registry;
mod worker;

pub use dispatcher::{Engine, Lifecycle};
