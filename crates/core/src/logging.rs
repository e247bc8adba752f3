//! Tracing subscriber setup
//!
//! Embedders call [`init`] once at startup. `RUST_LOG` takes precedence over
//! the configured filter.

use crate::config::LogConfig;
use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// Returns an error if a global subscriber has already been installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = build_filter(config)?;

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
    };

    installed.map_err(|e| Error::Other(format!("Failed to install subscriber: {}", e)))?;
    tracing::info!(json = config.json, "hostloop logging initialized");
    Ok(())
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            Error::ConfigError(format!("Invalid log filter '{}': {}", config.filter, e))
        }),
    }
}
