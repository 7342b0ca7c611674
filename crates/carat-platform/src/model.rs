//! Resource model for a single chat server ("guild").

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{CategoryId, ChannelId, RoleId, UserId};

/// Id of the implicit role every member holds ("@everyone").
pub const DEFAULT_ROLE_ID: RoleId = RoleId(1);

/// A view-permission overwrite for one role on one channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub role: RoleId,
    /// `true` grants view access, `false` denies it.
    pub view: bool,
}

/// A text channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    /// Platform id
    pub id: ChannelId,

    /// Display name
    pub name: String,

    /// Channel topic (empty when cleared)
    #[serde(default)]
    pub topic: String,

    /// Position within its category, 0 is the top
    pub position: u32,

    /// Containing category, if any
    pub category: Option<CategoryId>,

    /// Per-role view overwrites
    #[serde(default)]
    pub overwrites: Vec<PermissionOverwrite>,
}

impl Channel {
    /// View overwrite for a role, `None` when the channel inherits.
    pub fn view_overwrite(&self, role: RoleId) -> Option<bool> {
        self.overwrites
            .iter()
            .find(|o| o.role == role)
            .map(|o| o.view)
    }

    /// Set the view overwrite for a role.
    pub fn set_view_overwrite(&mut self, role: RoleId, view: bool) {
        match self.overwrites.iter_mut().find(|o| o.role == role) {
            Some(existing) => existing.view = view,
            None => self.overwrites.push(PermissionOverwrite { role, view }),
        }
    }
}

/// A channel category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub position: u32,
}

/// A server role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

/// A server member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,

    /// Display name
    pub name: String,

    /// Automated (bot / service) account
    #[serde(default)]
    pub bot: bool,

    /// Roles held, excluding the implicit default role
    #[serde(default)]
    pub roles: BTreeSet<RoleId>,
}

impl Member {
    /// Whether the member currently holds `role`.
    pub fn has_role(&self, role: RoleId) -> bool {
        role == DEFAULT_ROLE_ID || self.roles.contains(&role)
    }
}

/// A partial channel edit. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelEdit {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub position: Option<u32>,
    pub category: Option<CategoryId>,
}

impl ChannelEdit {
    /// An empty edit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename the channel.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the topic. An empty string clears it.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Move the channel to a position within its (possibly new) category.
    #[must_use]
    pub fn position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    /// Move the channel into another category.
    #[must_use]
    pub fn category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }
}

/// Complete, serializable state of one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuildSnapshot {
    /// The implicit role every member holds
    pub default_role: RoleId,

    #[serde(default)]
    pub categories: Vec<Category>,

    #[serde(default)]
    pub channels: Vec<Channel>,

    #[serde(default)]
    pub roles: Vec<Role>,

    #[serde(default)]
    pub members: Vec<Member>,

    /// Next id handed out for a new resource
    pub next_id: u64,
}

impl Default for GuildSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl GuildSnapshot {
    /// An empty server with only the default role.
    pub fn new() -> Self {
        Self {
            default_role: DEFAULT_ROLE_ID,
            categories: Vec::new(),
            channels: Vec::new(),
            roles: vec![Role {
                id: DEFAULT_ROLE_ID,
                name: "@everyone".to_string(),
            }],
            members: Vec::new(),
            next_id: 100,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Add a category at the bottom of the category list.
    pub fn add_category(&mut self, name: &str) -> CategoryId {
        let id = CategoryId(self.allocate_id());
        let position = self.categories.len() as u32;
        self.categories.push(Category {
            id,
            name: name.to_string(),
            position,
        });
        id
    }

    /// Add a channel at the bottom of `category`.
    pub fn add_channel(&mut self, name: &str, category: Option<CategoryId>) -> ChannelId {
        let id = ChannelId(self.allocate_id());
        let position = self.channels_in(category).count() as u32;
        self.channels.push(Channel {
            id,
            name: name.to_string(),
            topic: String::new(),
            position,
            category,
            overwrites: Vec::new(),
        });
        id
    }

    /// Add a role.
    pub fn add_role(&mut self, name: &str) -> RoleId {
        let id = RoleId(self.allocate_id());
        self.roles.push(Role {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Add a member holding `roles`.
    pub fn add_member(&mut self, name: &str, bot: bool, roles: &[RoleId]) -> UserId {
        let id = UserId(self.allocate_id());
        self.members.push(Member {
            id,
            name: name.to_string(),
            bot,
            roles: roles.iter().copied().collect(),
        });
        id
    }

    /// Look up a channel.
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Look up a channel mutably.
    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    /// Look up a member.
    pub fn member(&self, id: UserId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Look up a member mutably.
    pub fn member_mut(&mut self, id: UserId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    /// Whether a role exists.
    pub fn has_role(&self, id: RoleId) -> bool {
        self.roles.iter().any(|r| r.id == id)
    }

    /// Channels in a category, in no particular order.
    pub fn channels_in(&self, category: Option<CategoryId>) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(move |c| c.category == category)
    }

    /// Channels in a category sorted by position (top first).
    pub fn sorted_channels_in(&self, category: Option<CategoryId>) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.channels_in(category).cloned().collect();
        channels.sort_by_key(|c| (c.position, c.id));
        channels
    }

    /// Place `channel` at `index` within its current category and renumber
    /// the category so positions run 0..n without gaps.
    pub fn reorder(&mut self, channel: ChannelId, index: usize) {
        let Some(category) = self.channel(channel).map(|c| c.category) else {
            return;
        };

        let mut order: Vec<ChannelId> = self
            .sorted_channels_in(category)
            .into_iter()
            .map(|c| c.id)
            .filter(|id| *id != channel)
            .collect();
        order.insert(index.min(order.len()), channel);
        self.apply_order(&order);
    }

    /// Renumber a category's positions to 0..n keeping relative order.
    pub fn compact(&mut self, category: Option<CategoryId>) {
        let order: Vec<ChannelId> = self
            .sorted_channels_in(category)
            .into_iter()
            .map(|c| c.id)
            .collect();
        self.apply_order(&order);
    }

    fn apply_order(&mut self, order: &[ChannelId]) {
        for (position, id) in order.iter().enumerate() {
            if let Some(c) = self.channel_mut(*id) {
                c.position = position as u32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_guild_has_default_role() {
        let guild = GuildSnapshot::new();
        assert!(guild.has_role(guild.default_role));
        assert_eq!(guild.roles.len(), 1);
    }

    #[test]
    fn channels_append_to_their_category() {
        let mut guild = GuildSnapshot::new();
        let games = guild.add_category("Games");
        let a = guild.add_channel("text-game-1", Some(games));
        let b = guild.add_channel("text-game-2", Some(games));
        let lobby = guild.add_channel("lobby", None);

        assert_eq!(guild.channel(a).unwrap().position, 0);
        assert_eq!(guild.channel(b).unwrap().position, 1);
        assert_eq!(guild.channel(lobby).unwrap().position, 0);
    }

    #[test]
    fn reorder_moves_channel_and_closes_gaps() {
        let mut guild = GuildSnapshot::new();
        let games = guild.add_category("Games");
        let a = guild.add_channel("a", Some(games));
        let b = guild.add_channel("b", Some(games));
        let c = guild.add_channel("c", Some(games));

        guild.reorder(c, 0);

        let names: Vec<String> = guild
            .sorted_channels_in(Some(games))
            .into_iter()
            .map(|ch| ch.name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(guild.channel(c).unwrap().position, 0);
        assert_eq!(guild.channel(a).unwrap().position, 1);
        assert_eq!(guild.channel(b).unwrap().position, 2);
    }

    #[test]
    fn view_overwrites() {
        let mut guild = GuildSnapshot::new();
        let id = guild.add_channel("kibitz-game-3", None);
        let everyone = guild.default_role;
        let channel = guild.channel_mut(id).unwrap();

        assert_eq!(channel.view_overwrite(everyone), None);
        channel.set_view_overwrite(everyone, true);
        assert_eq!(channel.view_overwrite(everyone), Some(true));
        channel.set_view_overwrite(everyone, false);
        assert_eq!(channel.view_overwrite(everyone), Some(false));
        assert_eq!(channel.overwrites.len(), 1);
    }

    #[test]
    fn member_roles() {
        let mut guild = GuildSnapshot::new();
        let game = guild.add_role("Game-3");
        let user = guild.add_member("alice", false, &[game]);
        let member = guild.member(user).unwrap();

        assert!(member.has_role(game));
        assert!(member.has_role(guild.default_role));
    }

    #[test]
    fn channel_edit_builder() {
        let edit = ChannelEdit::new().name("x").topic("").position(3);
        assert_eq!(edit.name.as_deref(), Some("x"));
        assert_eq!(edit.topic.as_deref(), Some(""));
        assert_eq!(edit.position, Some(3));
        assert_eq!(edit.category, None);
    }
}
