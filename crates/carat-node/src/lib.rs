//! Carat Node - game host daemon.
//!
//! Runs the game lifecycle against an in-memory guild persisted as JSON.
//!
//! # Architecture
//!
//! - **Node**: configuration, state loading and service startup
//! - **Admin Socket**: Unix socket for lifecycle commands (carat-admin CLI)
//! - **API**: read-only HTTP endpoints for session and archive status
//!
//! # Example
//!
//! ```no_run
//! use carat_node::{CaratNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = CaratNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod node;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use node::{CaratNode, NodeConfig, NodeState};
