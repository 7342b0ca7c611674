//! Carat Town Square - vote state for running games.
//!
//! Each game with voting in progress has a [`TownSquare`]: who is seated and
//! the vote state the voting front end stored for it. [`TownSquares`] keeps
//! them all in one JSON file and implements the lifecycle's
//! [`VotingSessions`](carat_lifecycle::VotingSessions) hand-off, so ending a
//! game drops its town square and flushes the file.

pub mod error;
pub mod square;
pub mod store;

pub use error::{Error, Result};
pub use square::{Player, TownSquare};
pub use store::TownSquares;
