//! Error types for the Carat node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the node.
#[derive(Debug, Error)]
pub enum Error {
    /// Lifecycle error
    #[error(transparent)]
    Lifecycle(#[from] carat_lifecycle::LifecycleError),

    /// Platform error
    #[error("Platform error: {0}")]
    Platform(#[from] carat_platform::PlatformError),

    /// Town square store error
    #[error("Town square error: {0}")]
    TownSquare(#[from] carat_townsquare::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
