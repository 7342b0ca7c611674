//! Hand-off to the voting / town-square subsystem.
//!
//! The lifecycle core does not own vote state. When a game ends it asks the
//! subsystem, through this narrow capability, to drop the game's state and
//! flush its storage.

use async_trait::async_trait;
use thiserror::Error;

use crate::session::SessionNumber;

/// Error returned when the voting subsystem cannot persist its state.
#[derive(Debug, Error)]
#[error("voting state could not be persisted: {0}")]
pub struct VotingError(pub String);

/// Capability the lifecycle needs from the voting subsystem.
#[async_trait]
pub trait VotingSessions: Send + Sync {
    /// Whether vote state exists for the session.
    async fn has_session(&self, session: &SessionNumber) -> bool;

    /// Drop the session's vote state. Returns whether anything was removed.
    async fn discard_session(&self, session: &SessionNumber) -> bool;

    /// Flush the subsystem's state to storage.
    async fn persist(&self) -> Result<(), VotingError>;
}
