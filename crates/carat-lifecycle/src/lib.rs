//! Carat Lifecycle - game session lifecycle and bounded archive manager.
//!
//! Drives a Blood on the Clocktower game hosted on a chat server through its
//! lifecycle. A game is identified by a short session number and owns four
//! resources found by name: a game channel, a kibitz (spectator) channel, a
//! player role and a spectator role.
//!
//! # Architecture
//!
//! - **Authorizer**: only the game's storyteller (or a moderator) may act
//! - **Locator**: session number → platform resources, via a name index
//! - **Lifecycle**: the four composite transitions, with per-session locks
//!   and partial-failure reporting
//! - **Archive**: retired game channels, oldest evicted at capacity
//! - **Voting**: hand-off telling the town-square subsystem a game ended
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use carat_lifecycle::{Invocation, Lifecycle, LifecycleConfig, SessionNumber};
//! use carat_platform::MemoryPlatform;
//!
//! let platform = Arc::new(MemoryPlatform::load("guild.json").await?);
//! let lifecycle = Lifecycle::new(platform, LifecycleConfig::from_env()?)?;
//! lifecycle.hydrate().await?;
//!
//! let game: SessionNumber = "12".parse()?;
//! let report = lifecycle.end_game(&Invocation::new(storyteller, game)).await?;
//! ```

pub mod archive;
pub mod authorizer;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod locator;
pub mod naming;
pub mod session;
pub mod voting;

pub use archive::{ArchiveEntry, ArchiveStore, DEFAULT_ARCHIVE_CAPACITY};
pub use authorizer::Authorizer;
pub use config::LifecycleConfig;
pub use error::{LifecycleError, Result};
pub use lifecycle::{
    Invocation, Lifecycle, Operation, RevocationFailure, RevocationSummary, Step,
    TransitionReport,
};
pub use locator::{ResourceLocator, SessionResources};
pub use naming::{NamingConvention, ResourceKind};
pub use session::{SessionNumber, SessionRecord, SessionState};
pub use voting::{VotingError, VotingSessions};
