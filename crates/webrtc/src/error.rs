//! Error types for the WebRTC proxy layer

use crate::engine::EngineError;
use thiserror::Error;

/// Result type alias for proxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the WebRTC proxy layer
#[derive(Debug, Error)]
pub enum Error {
    /// The native engine rejected an operation
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Operation not allowed in the object's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Error from the host-loop core
    #[error("Core error: {0}")]
    Core(#[from] hostloop_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<Error> for hostloop_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            other => hostloop_core::Error::Construction(other.to_string()),
        }
    }
}
