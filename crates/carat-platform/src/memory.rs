//! In-memory chat platform.
//!
//! Holds a whole server in a [`GuildSnapshot`] behind an async lock. Used by
//! the node for offline game hosting (the snapshot is loaded from and saved
//! to JSON) and by tests, which can inspect every message sent and inject
//! failures or stalls into individual calls.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::{PlatformError, Result};
use crate::ids::{CategoryId, ChannelId, RoleId, UserId};
use crate::model::{Category, Channel, ChannelEdit, GuildSnapshot, Member, Role};
use crate::platform::ChatPlatform;

/// Platform operations that can be targeted by a [`Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Catalog,
    Member,
    RoleMembers,
    SetViewPermission,
    AddRole,
    RemoveRole,
    CloneChannel,
    EditChannel,
    DeleteChannel,
    SendMessage,
    DirectMessage,
}

impl Op {
    /// Whether the operation changes server state.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::SetViewPermission
                | Self::AddRole
                | Self::RemoveRole
                | Self::CloneChannel
                | Self::EditChannel
                | Self::DeleteChannel
        )
    }
}

/// What an injected fault does to a matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultEffect {
    /// Fail with a transport error before touching state.
    Fail,
    /// Sleep before executing the call.
    Stall(Duration),
}

/// An injected fault. Stays active until [`MemoryPlatform::clear_faults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub op: Op,
    /// Channel or user id the fault applies to (`None` = every call).
    pub target: Option<u64>,
    pub effect: FaultEffect,
}

impl Fault {
    /// Fail every call of `op`.
    pub fn fail(op: Op) -> Self {
        Self {
            op,
            target: None,
            effect: FaultEffect::Fail,
        }
    }

    /// Delay every call of `op`.
    pub fn stall(op: Op, delay: Duration) -> Self {
        Self {
            op,
            target: None,
            effect: FaultEffect::Stall(delay),
        }
    }

    /// Restrict the fault to calls addressing `target`.
    #[must_use]
    pub fn on(mut self, target: u64) -> Self {
        self.target = Some(target);
        self
    }
}

/// Where a recorded message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    Channel(ChannelId),
    Direct(UserId),
}

/// A message sent through the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub target: MessageTarget,
    pub content: String,
}

/// An in-memory server.
#[derive(Debug)]
pub struct MemoryPlatform {
    guild: RwLock<GuildSnapshot>,
    outbox: Mutex<Vec<SentMessage>>,
    faults: Mutex<Vec<Fault>>,
    mutations: Mutex<Vec<Op>>,
    saves: Mutex<()>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new(GuildSnapshot::new())
    }
}

impl MemoryPlatform {
    /// Create a platform serving `guild`.
    pub fn new(guild: GuildSnapshot) -> Self {
        Self {
            guild: RwLock::new(guild),
            outbox: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
            mutations: Mutex::new(Vec::new()),
            saves: Mutex::new(()),
        }
    }

    /// Load a guild snapshot from a JSON file.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read(path.as_ref()).await?;
        let guild: GuildSnapshot = serde_json::from_slice(&data)?;
        debug!(
            "Loaded guild snapshot from {:?} ({} channels, {} members)",
            path.as_ref(),
            guild.channels.len(),
            guild.members.len()
        );
        Ok(Self::new(guild))
    }

    /// Write the current guild state to a JSON file.
    ///
    /// The file is replaced atomically via a sibling temporary file. Saves
    /// from the same platform run one at a time.
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let _saving = self.saves.lock().await;
        let data = serde_json::to_vec_pretty(&*self.guild.read().await)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// A copy of the current guild state.
    pub async fn snapshot(&self) -> GuildSnapshot {
        self.guild.read().await.clone()
    }

    /// Change the guild directly, the way a server admin would outside the
    /// bot. Not counted as a mutation.
    pub async fn modify<T>(&self, change: impl FnOnce(&mut GuildSnapshot) -> T) -> T {
        change(&mut *self.guild.write().await)
    }

    /// Every message sent so far, oldest first.
    pub async fn messages(&self) -> Vec<SentMessage> {
        self.outbox.lock().await.clone()
    }

    /// Messages posted in one channel.
    pub async fn channel_messages(&self, channel: ChannelId) -> Vec<String> {
        self.outbox
            .lock()
            .await
            .iter()
            .filter(|m| m.target == MessageTarget::Channel(channel))
            .map(|m| m.content.clone())
            .collect()
    }

    /// Direct messages sent to one user.
    pub async fn direct_messages(&self, user: UserId) -> Vec<String> {
        self.outbox
            .lock()
            .await
            .iter()
            .filter(|m| m.target == MessageTarget::Direct(user))
            .map(|m| m.content.clone())
            .collect()
    }

    /// Number of state-changing calls that went through.
    pub async fn mutation_count(&self) -> usize {
        self.mutations.lock().await.len()
    }

    /// Inject a fault.
    pub async fn inject(&self, fault: Fault) {
        self.faults.lock().await.push(fault);
    }

    /// Remove all injected faults.
    pub async fn clear_faults(&self) {
        self.faults.lock().await.clear();
    }

    async fn check(&self, op: Op, target: u64) -> Result<()> {
        let effect = {
            let faults = self.faults.lock().await;
            faults
                .iter()
                .find(|f| f.op == op && f.target.map_or(true, |t| t == target))
                .map(|f| f.effect)
        };

        match effect {
            Some(FaultEffect::Fail) => Err(PlatformError::Transport(format!(
                "injected {:?} failure on {}",
                op, target
            ))),
            Some(FaultEffect::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn record(&self, op: Op) {
        trace!("memory platform: {:?}", op);
        if op.is_mutation() {
            self.mutations.lock().await.push(op);
        }
    }
}

fn channel_not_found(id: ChannelId) -> PlatformError {
    PlatformError::NotFound {
        kind: "channel",
        id: id.get(),
    }
}

fn member_not_found(id: UserId) -> PlatformError {
    PlatformError::NotFound {
        kind: "member",
        id: id.get(),
    }
}

fn role_not_found(id: RoleId) -> PlatformError {
    PlatformError::NotFound {
        kind: "role",
        id: id.get(),
    }
}

#[async_trait]
impl ChatPlatform for MemoryPlatform {
    fn default_role(&self) -> RoleId {
        crate::model::DEFAULT_ROLE_ID
    }

    async fn channels(&self) -> Result<Vec<Channel>> {
        self.check(Op::Catalog, 0).await?;
        Ok(self.guild.read().await.channels.clone())
    }

    async fn channel(&self, id: ChannelId) -> Result<Channel> {
        self.check(Op::Catalog, id.get()).await?;
        self.guild
            .read()
            .await
            .channel(id)
            .cloned()
            .ok_or_else(|| channel_not_found(id))
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        self.check(Op::Catalog, 0).await?;
        Ok(self.guild.read().await.categories.clone())
    }

    async fn category_channels(&self, category: CategoryId) -> Result<Vec<Channel>> {
        self.check(Op::Catalog, category.get()).await?;
        let guild = self.guild.read().await;
        if !guild.categories.iter().any(|c| c.id == category) {
            return Err(PlatformError::NotFound {
                kind: "category",
                id: category.get(),
            });
        }
        Ok(guild.sorted_channels_in(Some(category)))
    }

    async fn roles(&self) -> Result<Vec<Role>> {
        self.check(Op::Catalog, 0).await?;
        Ok(self.guild.read().await.roles.clone())
    }

    async fn member(&self, user: UserId) -> Result<Option<Member>> {
        self.check(Op::Member, user.get()).await?;
        Ok(self.guild.read().await.member(user).cloned())
    }

    async fn role_members(&self, role: RoleId) -> Result<Vec<Member>> {
        self.check(Op::RoleMembers, role.get()).await?;
        let guild = self.guild.read().await;
        if !guild.has_role(role) {
            return Err(role_not_found(role));
        }
        Ok(guild
            .members
            .iter()
            .filter(|m| m.has_role(role))
            .cloned()
            .collect())
    }

    async fn view_permission(&self, channel: ChannelId, role: RoleId) -> Result<Option<bool>> {
        self.check(Op::Catalog, channel.get()).await?;
        self.guild
            .read()
            .await
            .channel(channel)
            .map(|c| c.view_overwrite(role))
            .ok_or_else(|| channel_not_found(channel))
    }

    async fn set_view_permission(&self, channel: ChannelId, role: RoleId, allow: bool) -> Result<()> {
        self.check(Op::SetViewPermission, channel.get()).await?;
        let mut guild = self.guild.write().await;
        if !guild.has_role(role) {
            return Err(role_not_found(role));
        }
        guild
            .channel_mut(channel)
            .ok_or_else(|| channel_not_found(channel))?
            .set_view_overwrite(role, allow);
        drop(guild);
        self.record(Op::SetViewPermission).await;
        Ok(())
    }

    async fn add_role(&self, user: UserId, role: RoleId) -> Result<()> {
        self.check(Op::AddRole, user.get()).await?;
        let mut guild = self.guild.write().await;
        if !guild.has_role(role) {
            return Err(role_not_found(role));
        }
        guild
            .member_mut(user)
            .ok_or_else(|| member_not_found(user))?
            .roles
            .insert(role);
        drop(guild);
        self.record(Op::AddRole).await;
        Ok(())
    }

    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<()> {
        self.check(Op::RemoveRole, user.get()).await?;
        let mut guild = self.guild.write().await;
        guild
            .member_mut(user)
            .ok_or_else(|| member_not_found(user))?
            .roles
            .remove(&role);
        drop(guild);
        self.record(Op::RemoveRole).await;
        Ok(())
    }

    async fn clone_channel(&self, channel: ChannelId, reason: &str) -> Result<Channel> {
        self.check(Op::CloneChannel, channel.get()).await?;
        let mut guild = self.guild.write().await;
        let source = guild
            .channel(channel)
            .cloned()
            .ok_or_else(|| channel_not_found(channel))?;

        let id = guild.add_channel(&source.name, source.category);
        let clone = guild.channel_mut(id).ok_or_else(|| channel_not_found(id))?;
        clone.topic = source.topic;
        clone.overwrites = source.overwrites;
        let clone = clone.clone();
        drop(guild);

        debug!("Cloned channel {} into {} ({})", channel, id, reason);
        self.record(Op::CloneChannel).await;
        Ok(clone)
    }

    async fn edit_channel(&self, channel: ChannelId, edit: ChannelEdit) -> Result<Channel> {
        self.check(Op::EditChannel, channel.get()).await?;
        let mut guild = self.guild.write().await;

        if let Some(category) = edit.category {
            if !guild.categories.iter().any(|c| c.id == category) {
                return Err(PlatformError::NotFound {
                    kind: "category",
                    id: category.get(),
                });
            }
        }

        let target = guild
            .channel_mut(channel)
            .ok_or_else(|| channel_not_found(channel))?;
        let previous_category = target.category;
        if let Some(name) = edit.name {
            target.name = name;
        }
        if let Some(topic) = edit.topic {
            target.topic = topic;
        }
        let moved = match edit.category {
            Some(category) if Some(category) != previous_category => {
                target.category = Some(category);
                true
            }
            _ => false,
        };

        if moved {
            guild.compact(previous_category);
        }
        match (edit.position, moved) {
            (Some(position), _) => guild.reorder(channel, position as usize),
            // Channels moved into a category land at the top.
            (None, true) => guild.reorder(channel, 0),
            (None, false) => {}
        }

        let updated = guild
            .channel(channel)
            .cloned()
            .ok_or_else(|| channel_not_found(channel))?;
        drop(guild);
        self.record(Op::EditChannel).await;
        Ok(updated)
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<()> {
        self.check(Op::DeleteChannel, channel.get()).await?;
        let mut guild = self.guild.write().await;
        let index = guild
            .channels
            .iter()
            .position(|c| c.id == channel)
            .ok_or_else(|| channel_not_found(channel))?;
        let removed = guild.channels.remove(index);
        guild.compact(removed.category);
        drop(guild);
        self.record(Op::DeleteChannel).await;
        Ok(())
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<()> {
        self.check(Op::SendMessage, channel.get()).await?;
        if self.guild.read().await.channel(channel).is_none() {
            return Err(channel_not_found(channel));
        }
        self.outbox.lock().await.push(SentMessage {
            target: MessageTarget::Channel(channel),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn direct_message(&self, user: UserId, content: &str) -> Result<()> {
        self.check(Op::DirectMessage, user.get()).await?;
        if self.guild.read().await.member(user).is_none() {
            return Err(member_not_found(user));
        }
        self.outbox.lock().await.push(SentMessage {
            target: MessageTarget::Direct(user),
            content: content.to_string(),
        });
        Ok(())
    }
}
