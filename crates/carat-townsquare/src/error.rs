//! Error types for the town square store.

use thiserror::Error;

/// Result type for town square operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing town squares.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No town square exists for the game
    #[error("no town square for game {0}")]
    UnknownGame(String),
}
