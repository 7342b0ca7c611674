//! Guild fixtures for cross-crate lifecycle scenarios.

use std::sync::Arc;

use carat_lifecycle::{archive::retired_name, Lifecycle, LifecycleConfig, SessionNumber};
use carat_platform::{
    CategoryId, ChannelId, ChatPlatform, GuildSnapshot, MemoryPlatform, RoleId, UserId,
};
use carat_townsquare::TownSquares;
use chrono::{Duration, TimeZone, Utc};

/// The resources created for one game.
#[derive(Debug, Clone)]
pub struct Game {
    pub number: SessionNumber,
    pub game_channel: ChannelId,
    pub kibitz_channel: ChannelId,
    pub player_role: RoleId,
    pub spectator_role: RoleId,
    pub storyteller_role: RoleId,
    pub storyteller: UserId,
}

/// Builds a server laid out the way the lifecycle expects.
pub struct GuildBuilder {
    guild: GuildSnapshot,
    games: CategoryId,
    archive: CategoryId,
}

impl Default for GuildBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GuildBuilder {
    /// A server with a `Games` and an `Archive` category.
    pub fn new() -> Self {
        let mut guild = GuildSnapshot::new();
        let games = guild.add_category("Games");
        let archive = guild.add_category("Archive");
        Self {
            guild,
            games,
            archive,
        }
    }

    pub fn games_category(&self) -> CategoryId {
        self.games
    }

    pub fn archive_category(&self) -> CategoryId {
        self.archive
    }

    /// Add game `number`: both channels (kibitz hidden), three roles and a
    /// storyteller.
    pub fn game(&mut self, number: &str) -> Game {
        let game_channel = self.channel(&format!("text-game-{}", number));
        let kibitz_channel = self.channel(&format!("kibitz-game-{}", number));
        let default_role = self.guild.default_role;
        if let Some(kibitz) = self.guild.channel_mut(kibitz_channel) {
            kibitz.set_view_overwrite(default_role, false);
        }

        let player_role = self.guild.add_role(&format!("Game-{}", number));
        let spectator_role = self.guild.add_role(&format!("Kibitz-{}", number));
        let storyteller_role = self.guild.add_role(&format!("ST-{}", number));
        let storyteller =
            self.guild
                .add_member(&format!("storyteller-{}", number), false, &[storyteller_role]);

        Game {
            number: session(number),
            game_channel,
            kibitz_channel,
            player_role,
            spectator_role,
            storyteller_role,
            storyteller,
        }
    }

    /// Add a channel at the bottom of the games category.
    pub fn channel(&mut self, name: &str) -> ChannelId {
        self.guild.add_channel(name, Some(self.games))
    }

    /// Add a channel outside any category.
    pub fn loose_channel(&mut self, name: &str) -> ChannelId {
        self.guild.add_channel(name, None)
    }

    pub fn role(&mut self, name: &str) -> RoleId {
        self.guild.add_role(name)
    }

    pub fn member(&mut self, name: &str, bot: bool, roles: &[RoleId]) -> UserId {
        self.guild.add_member(name, bot, roles)
    }

    /// Fill the archive with `count` retired channels. Returns their ids
    /// oldest first.
    pub fn fill_archive(&mut self, count: usize) -> Vec<ChannelId> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single();
        let mut ids = Vec::with_capacity(count);
        // Newest retirements sit at the top of the category.
        for age in (0..count).rev() {
            let at = start.map(|s| s + Duration::days(age as i64)).unwrap_or_else(Utc::now);
            let name = retired_name(&format!("text-game-old{}", age), at);
            ids.push(self.guild.add_channel(&name, Some(self.archive)));
        }
        ids.reverse();
        ids
    }

    pub fn build(self) -> GuildSnapshot {
        self.guild
    }
}

/// Parse a session number.
pub fn session(number: &str) -> SessionNumber {
    match SessionNumber::parse(number) {
        Ok(n) => n,
        Err(e) => panic!("bad session number in fixture: {}", e),
    }
}

/// A hydrated lifecycle manager over an in-memory guild.
pub struct Harness {
    pub platform: Arc<MemoryPlatform>,
    pub lifecycle: Lifecycle,
    pub town_squares: Arc<TownSquares>,
}

impl Harness {
    pub async fn new(guild: GuildSnapshot) -> Self {
        Self::with_config(guild, LifecycleConfig::default()).await
    }

    pub async fn with_config(guild: GuildSnapshot, config: LifecycleConfig) -> Self {
        Self::with_town_squares(guild, config, Arc::new(TownSquares::in_memory())).await
    }

    pub async fn with_town_squares(
        guild: GuildSnapshot,
        config: LifecycleConfig,
        town_squares: Arc<TownSquares>,
    ) -> Self {
        let platform = Arc::new(MemoryPlatform::new(guild));
        let dyn_platform: Arc<dyn ChatPlatform> = platform.clone();
        let lifecycle = match Lifecycle::new(dyn_platform, config) {
            Ok(lifecycle) => lifecycle.with_voting(town_squares.clone()),
            Err(e) => panic!("invalid fixture config: {}", e),
        };
        if let Err(e) = lifecycle.hydrate().await {
            panic!("hydrate failed: {}", e);
        }
        Self {
            platform,
            lifecycle,
            town_squares,
        }
    }

    pub async fn snapshot(&self) -> GuildSnapshot {
        self.platform.snapshot().await
    }
}
