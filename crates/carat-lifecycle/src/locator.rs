//! Resource Locator.
//!
//! Resolves the platform resources bound to a session number. Names are
//! parsed once into a [`ResourceIndex`] built from the platform catalog;
//! lookups hit the index, and a miss triggers a single catalog refresh
//! before the resource is declared missing.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use carat_platform::{Category, CategoryId, Channel, ChannelId, ChatPlatform, Role, RoleId};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::lifecycle::timed;
use crate::naming::{NamingConvention, ResourceKind};
use crate::session::SessionNumber;

/// All four resources bound to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionResources {
    pub game_channel: ChannelId,
    pub kibitz_channel: ChannelId,
    pub player_role: RoleId,
    pub spectator_role: RoleId,
}

/// The parts of the platform catalog the index is built from.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub channels: Vec<Channel>,
    pub categories: Vec<Category>,
    pub roles: Vec<Role>,
}

impl Catalog {
    /// Read the catalog from the platform.
    pub async fn fetch(platform: &dyn ChatPlatform) -> carat_platform::Result<Self> {
        Ok(Self {
            channels: platform.channels().await?,
            categories: platform.categories().await?,
            roles: platform.roles().await?,
        })
    }
}

/// Names the index resolves besides the per-session resources.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub naming: NamingConvention,
    pub archive_category: String,
    pub moderator_role: Option<String>,
    pub audit_channel: Option<String>,
}

impl From<&LifecycleConfig> for IndexSettings {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            naming: config.naming.clone(),
            archive_category: config.archive_category.clone(),
            moderator_role: config.moderator_role.clone(),
            audit_channel: config.audit_channel.clone(),
        }
    }
}

/// Outcome of an index lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Missing,
    Found(u64),
    Ambiguous(usize),
}

/// Session number → resource id registry.
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
    bindings: HashMap<(ResourceKind, SessionNumber), Vec<u64>>,
    archive_categories: Vec<CategoryId>,
    moderator_role: Option<RoleId>,
    audit_channel: Option<ChannelId>,
}

impl ResourceIndex {
    /// Build the index from a catalog.
    pub fn build(settings: &IndexSettings, catalog: &Catalog) -> Self {
        let mut index = Self::default();
        let naming = &settings.naming;

        index.archive_categories = catalog
            .categories
            .iter()
            .filter(|c| c.name.eq_ignore_ascii_case(&settings.archive_category))
            .map(|c| c.id)
            .collect();

        for channel in &catalog.channels {
            // Retired channels keep their name prefix but no longer count.
            let archived = channel
                .category
                .is_some_and(|c| index.archive_categories.contains(&c));
            if !archived {
                for kind in [ResourceKind::GameChannel, ResourceKind::KibitzChannel] {
                    if let Some(session) = naming.session_of(kind, &channel.name) {
                        index.bind(kind, session, channel.id.get());
                    }
                }
            }
            if settings.audit_channel.as_deref() == Some(channel.name.as_str()) {
                index.audit_channel.get_or_insert(channel.id);
            }
        }

        for role in &catalog.roles {
            for kind in [
                ResourceKind::PlayerRole,
                ResourceKind::SpectatorRole,
                ResourceKind::StorytellerRole,
            ] {
                if let Some(session) = naming.session_of(kind, &role.name) {
                    index.bind(kind, session, role.id.get());
                }
            }
            if settings.moderator_role.as_deref() == Some(role.name.as_str()) {
                index.moderator_role.get_or_insert(role.id);
            }
        }

        index
    }

    fn bind(&mut self, kind: ResourceKind, session: SessionNumber, id: u64) {
        self.bindings.entry((kind, session)).or_default().push(id);
    }

    /// Look up one resource.
    pub fn lookup(&self, kind: ResourceKind, session: &SessionNumber) -> Lookup {
        match self.bindings.get(&(kind, session.clone())).map(Vec::as_slice) {
            None | Some([]) => Lookup::Missing,
            Some([id]) => Lookup::Found(*id),
            Some(ids) => Lookup::Ambiguous(ids.len()),
        }
    }

    /// Point a session's resource at a new id.
    pub fn rebind(&mut self, kind: ResourceKind, session: &SessionNumber, id: u64) {
        self.bindings.insert((kind, session.clone()), vec![id]);
    }

    /// The archive category, if exactly one exists.
    pub fn archive_category(&self) -> Lookup {
        match self.archive_categories.as_slice() {
            [] => Lookup::Missing,
            [id] => Lookup::Found(id.get()),
            ids => Lookup::Ambiguous(ids.len()),
        }
    }

    /// Session numbers that currently have a game channel.
    pub fn sessions(&self) -> BTreeSet<SessionNumber> {
        self.bindings
            .keys()
            .filter(|(kind, _)| *kind == ResourceKind::GameChannel)
            .map(|(_, session)| session.clone())
            .collect()
    }
}

/// Resolves session resources against a platform.
pub struct ResourceLocator {
    platform: Arc<dyn ChatPlatform>,
    settings: IndexSettings,
    index: RwLock<ResourceIndex>,
    io_timeout: Duration,
}

impl ResourceLocator {
    /// Create a locator. The index starts empty and is filled on first use
    /// or by [`refresh`](Self::refresh).
    pub fn new(platform: Arc<dyn ChatPlatform>, config: &LifecycleConfig) -> Self {
        Self {
            platform,
            settings: IndexSettings::from(config),
            index: RwLock::new(ResourceIndex::default()),
            io_timeout: config.io_timeout,
        }
    }

    /// The naming convention in use.
    pub fn naming(&self) -> &NamingConvention {
        &self.settings.naming
    }

    /// Rebuild the index from the platform catalog.
    pub async fn refresh(&self) -> Result<()> {
        let catalog = timed(self.io_timeout, Catalog::fetch(self.platform.as_ref()))
            .await
            .map_err(LifecycleError::Catalog)?;
        let index = ResourceIndex::build(&self.settings, &catalog);
        debug!(
            "Resource index rebuilt: {} channels, {} roles, {} games",
            catalog.channels.len(),
            catalog.roles.len(),
            index.sessions().len()
        );
        *self.index.write().await = index;
        Ok(())
    }

    /// Drop the index so the next lookup re-reads the catalog.
    pub async fn invalidate(&self) {
        *self.index.write().await = ResourceIndex::default();
    }

    async fn locate(&self, kind: ResourceKind, session: &SessionNumber) -> Result<u64> {
        let mut found = self.index.read().await.lookup(kind, session);
        if found == Lookup::Missing {
            self.refresh().await?;
            found = self.index.read().await.lookup(kind, session);
        }

        match found {
            Lookup::Found(id) => Ok(id),
            Lookup::Missing => Err(LifecycleError::ResourceNotFound {
                kind,
                session: session.clone(),
            }),
            Lookup::Ambiguous(count) => {
                warn!("{} resources claim {} of game {}", count, kind, session);
                Err(LifecycleError::ResourceAmbiguous {
                    kind,
                    session: session.clone(),
                    count,
                })
            }
        }
    }

    /// The session's game channel.
    pub async fn game_channel(&self, session: &SessionNumber) -> Result<ChannelId> {
        self.locate(ResourceKind::GameChannel, session)
            .await
            .map(ChannelId)
    }

    /// The session's kibitz channel.
    pub async fn kibitz_channel(&self, session: &SessionNumber) -> Result<ChannelId> {
        self.locate(ResourceKind::KibitzChannel, session)
            .await
            .map(ChannelId)
    }

    /// The session's player role.
    pub async fn player_role(&self, session: &SessionNumber) -> Result<RoleId> {
        self.locate(ResourceKind::PlayerRole, session).await.map(RoleId)
    }

    /// The session's spectator (kibitz) role.
    pub async fn spectator_role(&self, session: &SessionNumber) -> Result<RoleId> {
        self.locate(ResourceKind::SpectatorRole, session)
            .await
            .map(RoleId)
    }

    /// The session's storyteller role.
    pub async fn storyteller_role(&self, session: &SessionNumber) -> Result<RoleId> {
        self.locate(ResourceKind::StorytellerRole, session)
            .await
            .map(RoleId)
    }

    /// All four bound resources.
    pub async fn resolve(&self, session: &SessionNumber) -> Result<SessionResources> {
        Ok(SessionResources {
            game_channel: self.game_channel(session).await?,
            kibitz_channel: self.kibitz_channel(session).await?,
            player_role: self.player_role(session).await?,
            spectator_role: self.spectator_role(session).await?,
        })
    }

    /// The archive category. `session` is only used for error context.
    pub async fn archive_category(&self, session: &SessionNumber) -> Result<CategoryId> {
        let mut found = self.index.read().await.archive_category();
        if found == Lookup::Missing {
            self.refresh().await?;
            found = self.index.read().await.archive_category();
        }

        match found {
            Lookup::Found(id) => Ok(CategoryId(id)),
            Lookup::Missing => Err(LifecycleError::ResourceNotFound {
                kind: ResourceKind::ArchiveCategory,
                session: session.clone(),
            }),
            Lookup::Ambiguous(count) => Err(LifecycleError::ResourceAmbiguous {
                kind: ResourceKind::ArchiveCategory,
                session: session.clone(),
                count,
            }),
        }
    }

    /// The archive category as currently indexed, without refreshing.
    pub async fn known_archive_category(&self) -> Option<CategoryId> {
        match self.index.read().await.archive_category() {
            Lookup::Found(id) => Some(CategoryId(id)),
            _ => None,
        }
    }

    /// The configured moderator role, if it exists. A configured role that
    /// is not indexed yet triggers one refresh.
    pub async fn moderator_role(&self) -> Option<RoleId> {
        self.settings.moderator_role.as_ref()?;
        if let Some(role) = self.index.read().await.moderator_role {
            return Some(role);
        }
        if let Err(e) = self.refresh().await {
            warn!("Moderator role lookup failed: {}", e);
            return None;
        }
        self.index.read().await.moderator_role
    }

    /// The configured audit channel, if it exists.
    pub async fn audit_channel(&self) -> Option<ChannelId> {
        self.index.read().await.audit_channel
    }

    /// Bind the session to a replacement game channel.
    pub async fn rebind_game_channel(&self, session: &SessionNumber, channel: ChannelId) {
        self.index
            .write()
            .await
            .rebind(ResourceKind::GameChannel, session, channel.get());
    }

    /// Session numbers that currently have a game channel.
    pub async fn sessions(&self) -> Vec<SessionNumber> {
        self.index.read().await.sessions().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carat_platform::{ChannelEdit, GuildSnapshot, MemoryPlatform};

    fn n(s: &str) -> SessionNumber {
        SessionNumber::parse(s).unwrap()
    }

    fn guild() -> GuildSnapshot {
        let mut guild = GuildSnapshot::new();
        let games = guild.add_category("Games");
        let archive = guild.add_category("Archive");
        guild.add_channel("text-game-1", Some(games));
        guild.add_channel("text-game-12", Some(games));
        guild.add_channel("kibitz-game-12", Some(games));
        guild.add_channel(
            "text-game-12 Archived on Mon, 19 Oct 2026 18 00 00",
            Some(archive),
        );
        guild.add_channel("bot-log", None);
        guild.add_role("Game-12");
        guild.add_role("Kibitz-12");
        guild.add_role("ST-12");
        guild.add_role("Game-1");
        guild.add_role("Moderator");
        guild
    }

    fn locator(platform: Arc<MemoryPlatform>) -> ResourceLocator {
        let config = LifecycleConfig::default()
            .with_moderator_role("Moderator")
            .with_audit_channel("bot-log");
        ResourceLocator::new(platform, &config)
    }

    #[tokio::test]
    async fn resolves_all_four_resources() {
        let platform = Arc::new(MemoryPlatform::new(guild()));
        let locator = locator(Arc::clone(&platform));

        let resources = locator.resolve(&n("12")).await.unwrap();
        let channels = platform.channels().await.unwrap();
        let name_of = |id: ChannelId| {
            channels
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.name.clone())
                .unwrap()
        };
        assert_eq!(name_of(resources.game_channel), "text-game-12");
        assert_eq!(name_of(resources.kibitz_channel), "kibitz-game-12");
        assert_ne!(resources.player_role, resources.spectator_role);
        assert!(locator.storyteller_role(&n("12")).await.is_ok());
        assert!(locator.moderator_role().await.is_some());
        assert!(locator.audit_channel().await.is_some());
    }

    #[tokio::test]
    async fn archived_channels_are_ignored() {
        let platform = Arc::new(MemoryPlatform::new(guild()));
        let locator = locator(platform);
        // Only the live channel counts, the archived copy is not ambiguous.
        assert!(locator.game_channel(&n("12")).await.is_ok());
        assert!(locator.archive_category(&n("12")).await.is_ok());
    }

    #[tokio::test]
    async fn missing_resource_is_reported_with_kind() {
        let platform = Arc::new(MemoryPlatform::new(guild()));
        let locator = locator(platform);

        match locator.kibitz_channel(&n("1")).await {
            Err(LifecycleError::ResourceNotFound { kind, session }) => {
                assert_eq!(kind, ResourceKind::KibitzChannel);
                assert_eq!(session, n("1"));
            }
            other => panic!("expected ResourceNotFound, got {:?}", other),
        }
        assert!(locator.game_channel(&n("99")).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_channels_are_ambiguous() {
        let mut guild = guild();
        guild.add_channel("TEXT-GAME-12", None);
        let locator = locator(Arc::new(MemoryPlatform::new(guild)));

        match locator.game_channel(&n("12")).await {
            Err(LifecycleError::ResourceAmbiguous { count, .. }) => assert_eq!(count, 2),
            other => panic!("expected ResourceAmbiguous, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn miss_triggers_refresh() {
        let platform = Arc::new(MemoryPlatform::new(guild()));
        let locator = locator(Arc::clone(&platform));
        locator.refresh().await.unwrap();
        assert!(locator.game_channel(&n("5")).await.is_err());

        // A channel renamed after the index was built is found on the next miss.
        let lobby = platform
            .channels()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "bot-log")
            .unwrap();
        platform
            .edit_channel(lobby.id, ChannelEdit::new().name("text-game-5"))
            .await
            .unwrap();

        assert_eq!(locator.game_channel(&n("5")).await.unwrap(), lobby.id);
        assert_eq!(locator.sessions().await, vec![n("1"), n("12"), n("5")]);
    }

    #[tokio::test]
    async fn rebind_points_at_replacement() {
        let platform = Arc::new(MemoryPlatform::new(guild()));
        let locator = locator(platform);
        locator.refresh().await.unwrap();

        locator.rebind_game_channel(&n("12"), ChannelId(4242)).await;
        assert_eq!(locator.game_channel(&n("12")).await.unwrap(), ChannelId(4242));
    }
}
