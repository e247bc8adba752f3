//! Error types for the hostloop core
//!
//! Only recoverable conditions live here. Violations of the designated-thread
//! discipline are invariant breaks and panic instead of returning an error.

use thiserror::Error;

/// Result type alias for hostloop core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the hostloop core
#[derive(Debug, Error)]
pub enum Error {
    /// A proxy factory refused to build an object for a key
    #[error("Construction failed: {0}")]
    Construction(String),

    /// The designated host thread has shut down or cannot be reached
    #[error("Host thread unavailable: {0}")]
    HostUnavailable(String),

    /// A blocking host call was issued from the host thread itself
    #[error("Blocking host call from the host thread would deadlock: {0}")]
    HostReentrancy(String),

    /// The host thread panicked while running a posted task
    #[error("Host thread panicked")]
    HostPanicked,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
