//! Error types for carat-lifecycle.

use carat_platform::{PlatformError, UserId};
use thiserror::Error;

use crate::lifecycle::{Operation, Step};
use crate::naming::ResourceKind;
use crate::session::{SessionNumber, SessionState};

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors that can occur while driving a game session.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The actor is not the storyteller of the session. Nothing was changed.
    #[error("{actor} is not the current storyteller for game {session}")]
    AuthorizationDenied {
        actor: UserId,
        session: SessionNumber,
    },

    /// A resource bound to the session could not be located.
    #[error("no {kind} found for game {session}")]
    ResourceNotFound {
        kind: ResourceKind,
        session: SessionNumber,
    },

    /// More than one resource claims the session.
    #[error("{count} {kind} resources match game {session}")]
    ResourceAmbiguous {
        kind: ResourceKind,
        session: SessionNumber,
        count: usize,
    },

    /// The session is in a state the operation cannot start from.
    #[error("cannot run {operation} on game {session} while it is {state}")]
    InvalidTransition {
        operation: Operation,
        session: SessionNumber,
        state: SessionState,
    },

    /// A platform mutation failed or timed out part way through a transition.
    #[error(
        "{operation} on game {session} failed at {step} after {} applied step(s): {source}",
        .applied.len()
    )]
    Platform {
        operation: Operation,
        session: SessionNumber,
        step: Step,
        applied: Vec<Step>,
        #[source]
        source: PlatformError,
    },

    /// The platform catalog could not be read.
    #[error("platform catalog unavailable: {0}")]
    Catalog(#[source] PlatformError),

    /// The archive grew past its capacity. This is a logic fault.
    #[error("archive holds {len} entries, capacity is {capacity}")]
    CapacityInvariantViolation { len: usize, capacity: usize },

    /// A session number failed validation.
    #[error("invalid session number: {0:?}")]
    InvalidSessionNumber(String),

    /// Configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LifecycleError {
    /// Whether the invocation was refused for lack of authorization (as
    /// opposed to failing while executing).
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::AuthorizationDenied { .. })
    }

    /// Steps that were applied before the failure. Empty for failures that
    /// happen before the first mutation.
    pub fn applied_steps(&self) -> &[Step] {
        match self {
            Self::Platform { applied, .. } => applied,
            _ => &[],
        }
    }

    /// Whether the failure left the session partially transitioned.
    pub fn is_partial(&self) -> bool {
        !self.applied_steps().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twelve() -> SessionNumber {
        SessionNumber::parse("12").unwrap()
    }

    #[test]
    fn denial_is_distinguishable() {
        let denied = LifecycleError::AuthorizationDenied {
            actor: UserId(5),
            session: twelve(),
        };
        let missing = LifecycleError::ResourceNotFound {
            kind: ResourceKind::KibitzChannel,
            session: twelve(),
        };
        assert!(denied.is_denied());
        assert!(!missing.is_denied());
        assert!(!denied.is_partial());
    }

    #[test]
    fn platform_failure_reports_partial_progress() {
        let err = LifecycleError::Platform {
            operation: Operation::ArchiveGame,
            session: twelve(),
            step: Step::EvictOldest,
            applied: vec![Step::CaptureSlot, Step::CloneChannel],
            source: PlatformError::Transport("503".into()),
        };
        assert!(err.is_partial());
        assert_eq!(
            err.to_string(),
            "ArchiveGame on game 12 failed at evict-oldest after 2 applied step(s): transport error: 503"
        );
    }

    #[test]
    fn resource_messages_name_the_session() {
        let err = LifecycleError::ResourceNotFound {
            kind: ResourceKind::PlayerRole,
            session: twelve(),
        };
        assert_eq!(err.to_string(), "no player role found for game 12");
    }
}
