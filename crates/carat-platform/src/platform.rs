//! The chat-platform collaborator interface.

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{CategoryId, ChannelId, RoleId, UserId};
use crate::model::{Category, Channel, ChannelEdit, Member, Role};

/// Operations the lifecycle core consumes from a chat platform.
///
/// Every method is an I/O call that may fail transiently. Implementations
/// must not retry internally; callers decide whether a failure aborts the
/// surrounding transition or is tolerated.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The implicit role every member holds.
    fn default_role(&self) -> RoleId;

    /// Every channel on the server.
    async fn channels(&self) -> Result<Vec<Channel>>;

    /// A single channel.
    async fn channel(&self, id: ChannelId) -> Result<Channel>;

    /// Every category on the server.
    async fn categories(&self) -> Result<Vec<Category>>;

    /// Channels in a category, sorted by position (top first).
    async fn category_channels(&self, category: CategoryId) -> Result<Vec<Channel>>;

    /// Every role on the server.
    async fn roles(&self) -> Result<Vec<Role>>;

    /// A member, or `None` if the user is not on the server.
    async fn member(&self, user: UserId) -> Result<Option<Member>>;

    /// Current holders of a role.
    async fn role_members(&self, role: RoleId) -> Result<Vec<Member>>;

    /// The view overwrite a role has on a channel (`None` = inherited).
    async fn view_permission(&self, channel: ChannelId, role: RoleId) -> Result<Option<bool>>;

    /// Grant or deny a role view access on a channel.
    async fn set_view_permission(&self, channel: ChannelId, role: RoleId, allow: bool) -> Result<()>;

    /// Give a member a role.
    async fn add_role(&self, user: UserId, role: RoleId) -> Result<()>;

    /// Take a role from a member. Removing a role the member does not hold
    /// succeeds.
    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<()>;

    /// Create an empty copy of a channel (name, topic, category, overwrites)
    /// at the bottom of its category.
    async fn clone_channel(&self, channel: ChannelId, reason: &str) -> Result<Channel>;

    /// Apply a partial edit and return the updated channel.
    async fn edit_channel(&self, channel: ChannelId, edit: ChannelEdit) -> Result<Channel>;

    /// Permanently delete a channel and its history.
    async fn delete_channel(&self, channel: ChannelId) -> Result<()>;

    /// Post a message in a channel.
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<()>;

    /// Send a direct message to a user.
    async fn direct_message(&self, user: UserId, content: &str) -> Result<()>;
}
