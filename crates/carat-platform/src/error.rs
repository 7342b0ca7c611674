//! Error types for platform operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Errors a chat platform call can produce.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The addressed resource does not exist (or no longer exists).
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    /// The platform refused the mutation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The call failed in transit (rate limit, gateway hiccup, 5xx).
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete in time.
    #[error("platform call timed out after {0:?}")]
    Timeout(Duration),

    /// Reading or writing a guild snapshot failed.
    #[error("snapshot I/O error: {0}")]
    Snapshot(#[from] std::io::Error),

    /// A guild snapshot could not be (de)serialized.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlatformError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(PlatformError::Transport("503".into()).is_transient());
        assert!(PlatformError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!PlatformError::Forbidden("missing permission".into()).is_transient());
        assert!(!PlatformError::NotFound { kind: "channel", id: 7 }.is_transient());
    }

    #[test]
    fn not_found_message_names_kind() {
        let err = PlatformError::NotFound { kind: "role", id: 42 };
        assert_eq!(err.to_string(), "role 42 not found");
    }
}
