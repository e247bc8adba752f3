//! Configuration for the host thread, event loops and logging
//!
//! Configuration can be built in code, parsed from TOML or JSON, and
//! overridden from the environment.
//!
//! # Example
//!
//! ```
//! use hostloop_core::config::HostConfig;
//!
//! let config = HostConfig::from_toml_str(r#"
//!     thread_name = "media-host"
//!
//!     [event_loop]
//!     backlog_warn_threshold = 256
//! "#).unwrap();
//!
//! assert_eq!(config.thread_name, "media-host");
//! assert_eq!(config.event_loop.backlog_warn_threshold, 256);
//! assert_eq!(config.log.filter, "info");
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding [`HostConfig::thread_name`]
pub const ENV_THREAD_NAME: &str = "HOSTLOOP_THREAD_NAME";

/// Environment variable overriding [`LogConfig::filter`]
pub const ENV_LOG: &str = "HOSTLOOP_LOG";

/// Environment variable overriding [`LoopConfig::backlog_warn_threshold`]
pub const ENV_BACKLOG_WARN: &str = "HOSTLOOP_BACKLOG_WARN";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Name given to the designated host thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Settings shared by every event loop
    #[serde(default)]
    pub event_loop: LoopConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Event loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Queue depth at which a backlog warning is logged
    #[serde(default = "default_backlog_warn_threshold")]
    pub backlog_warn_threshold: usize,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_thread_name() -> String {
    "hostloop-host".to_string()
}

fn default_backlog_warn_threshold() -> usize {
    1024
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            event_loop: LoopConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            backlog_warn_threshold: default_backlog_warn_threshold(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl HostConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Set the host thread name
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the backlog warning threshold
    pub fn with_backlog_warn_threshold(mut self, threshold: usize) -> Self {
        self.event_loop.backlog_warn_threshold = threshold;
        self
    }

    /// Apply `HOSTLOOP_*` environment overrides
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(name) = lookup(ENV_THREAD_NAME) {
            self.thread_name = name;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log.filter = filter;
        }
        if let Some(raw) = lookup(ENV_BACKLOG_WARN) {
            self.event_loop.backlog_warn_threshold = raw.trim().parse().map_err(|e| {
                Error::ConfigError(format!("{} must be an integer: {}", ENV_BACKLOG_WARN, e))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.thread_name.trim().is_empty() {
            return Err(Error::ConfigError("thread_name must not be empty".to_string()));
        }
        if self.event_loop.backlog_warn_threshold == 0 {
            return Err(Error::ConfigError(
                "event_loop.backlog_warn_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
