//! Carat Platform - chat-platform resources as seen by the game lifecycle.
//!
//! A game session on the chat server is nothing more than a handful of
//! platform resources (channels, roles, categories) tied together by name.
//! This crate models those resources and the narrow set of operations the
//! lifecycle core performs on them.
//!
//! # Overview
//!
//! - **Identifiers**: [`ChannelId`], [`RoleId`], [`UserId`], [`CategoryId`]
//! - **Model**: [`Channel`], [`Category`], [`Role`], [`Member`], [`ChannelEdit`]
//! - **Collaborator**: the [`ChatPlatform`] trait, implemented by a real
//!   chat SDK adapter or by [`MemoryPlatform`]
//! - **In-memory guild**: [`MemoryPlatform`] backed by a serializable
//!   [`GuildSnapshot`], with recorded messages and fault injection
//!
//! # Example
//!
//! ```rust,ignore
//! use carat_platform::{ChatPlatform, GuildSnapshot, MemoryPlatform};
//!
//! let mut guild = GuildSnapshot::new();
//! let games = guild.add_category("Games");
//! let channel = guild.add_channel("text-game-12", Some(games));
//!
//! let platform = MemoryPlatform::new(guild);
//! platform.send_message(channel, "hello").await?;
//! ```

pub mod error;
pub mod ids;
pub mod memory;
pub mod model;
pub mod platform;

pub use error::{PlatformError, Result};
pub use ids::{CategoryId, ChannelId, RoleId, UserId};
pub use memory::{Fault, FaultEffect, MemoryPlatform, MessageTarget, Op, SentMessage};
pub use model::{Category, Channel, ChannelEdit, GuildSnapshot, Member, PermissionOverwrite, Role};
pub use platform::ChatPlatform;
