//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup, fails fast on malformed values. Every setting has
//! a default, so an empty environment or an empty file is valid.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_THREAD_PREFIX: &str = "workpool";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Settings consumed by [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of worker threads spawned by `Engine::start_configured`.
    pub workers: usize,
    /// Threads are named `<thread_prefix>-worker-<index>` and
    /// `<thread_prefix>-dispatcher`.
    pub thread_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            thread_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(workers) = optional_var("WORKPOOL_WORKERS") {
            config.engine.workers = parse_workers(&workers)?;
        }
        if let Some(prefix) = optional_var("WORKPOOL_THREAD_PREFIX") {
            config.engine.thread_prefix = prefix;
        }
        config.otel_endpoint = optional_var("OTEL_ENDPOINT");
        if let Some(level) = optional_var("LOG_LEVEL") {
            config.log_level = level;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.workers == 0 {
            return Err(Error::Config("engine.workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_workers(value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "WORKPOOL_WORKERS must be a positive integer, got {value:?}"
        ))
    })
}
