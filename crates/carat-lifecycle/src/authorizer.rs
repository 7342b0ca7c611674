//! Storyteller authorization.

use std::sync::Arc;
use std::time::Duration;

use carat_platform::{ChatPlatform, UserId};
use tracing::{debug, warn};

use crate::lifecycle::timed;
use crate::locator::ResourceLocator;
use crate::session::SessionNumber;

/// Decides whether an actor may drive a session.
///
/// An actor is authorized when they hold the session's storyteller role, or
/// the configured moderator role. Lookups that fail count as "no": the
/// authorizer never errors.
pub struct Authorizer {
    platform: Arc<dyn ChatPlatform>,
    locator: Arc<ResourceLocator>,
    io_timeout: Duration,
}

impl Authorizer {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        locator: Arc<ResourceLocator>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            locator,
            io_timeout,
        }
    }

    /// Whether `actor` is currently a storyteller of `session`.
    pub async fn authorize(&self, actor: UserId, session: &SessionNumber) -> bool {
        let member = match timed(self.io_timeout, self.platform.member(actor)).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                debug!("Authorization for game {}: {} is not a member", session, actor);
                return false;
            }
            Err(e) => {
                warn!("Authorization for game {}: member lookup failed: {}", session, e);
                return false;
            }
        };

        let storyteller = match self.locator.storyteller_role(session).await {
            Ok(role) => member.has_role(role),
            Err(e) => {
                debug!("Authorization for game {}: {}", session, e);
                false
            }
        };
        if storyteller {
            return true;
        }

        match self.locator.moderator_role().await {
            Some(moderator) => member.has_role(moderator),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use carat_platform::{Fault, GuildSnapshot, MemoryPlatform, Op};
    use tokio_test::assert_ok;

    struct Fixture {
        platform: Arc<MemoryPlatform>,
        authorizer: Authorizer,
        storyteller: UserId,
        moderator: UserId,
        player: UserId,
    }

    fn fixture() -> Fixture {
        let mut guild = GuildSnapshot::new();
        guild.add_channel("text-game-3", None);
        let st = guild.add_role("ST-3");
        let game = guild.add_role("Game-3");
        let moderator_role = guild.add_role("Moderator");
        let storyteller = guild.add_member("st", false, &[st]);
        let moderator = guild.add_member("mod", false, &[moderator_role]);
        let player = guild.add_member("player", false, &[game]);

        let platform = Arc::new(MemoryPlatform::new(guild));
        let config = LifecycleConfig::default().with_moderator_role("Moderator");
        let locator = Arc::new(ResourceLocator::new(platform.clone(), &config));
        let authorizer = Authorizer::new(platform.clone(), locator, config.io_timeout);
        Fixture {
            platform,
            authorizer,
            storyteller,
            moderator,
            player,
        }
    }

    fn n(s: &str) -> SessionNumber {
        SessionNumber::parse(s).unwrap()
    }

    #[tokio::test]
    async fn storyteller_is_authorized_for_own_game_only() {
        let f = fixture();
        assert!(f.authorizer.authorize(f.storyteller, &n("3")).await);
        assert!(!f.authorizer.authorize(f.storyteller, &n("4")).await);
    }

    #[tokio::test]
    async fn players_are_not_storytellers() {
        let f = fixture();
        assert!(!f.authorizer.authorize(f.player, &n("3")).await);
    }

    #[tokio::test]
    async fn moderators_may_act_everywhere() {
        let f = fixture();
        assert!(f.authorizer.authorize(f.moderator, &n("3")).await);
        assert!(f.authorizer.authorize(f.moderator, &n("77")).await);
    }

    #[tokio::test]
    async fn unknown_actor_or_session_is_denied_without_error() {
        let f = fixture();
        assert!(!f.authorizer.authorize(UserId(123456), &n("3")).await);
        assert!(!f.authorizer.authorize(f.storyteller, &n("doesnotexist")).await);
    }

    #[tokio::test]
    async fn lookup_failure_denies() {
        let f = fixture();
        f.platform.inject(Fault::fail(Op::Member)).await;
        assert!(!f.authorizer.authorize(f.storyteller, &n("3")).await);
    }

    #[tokio::test]
    async fn moderator_role_created_later_is_seen() {
        let mut guild = GuildSnapshot::new();
        guild.add_channel("text-game-5", None);
        let st = guild.add_role("ST-5");
        let storyteller = guild.add_member("st", false, &[st]);
        let late = guild.add_member("late-mod", false, &[]);

        let platform = Arc::new(MemoryPlatform::new(guild));
        let config = LifecycleConfig::default().with_moderator_role("Moderator");
        let locator = Arc::new(ResourceLocator::new(platform.clone(), &config));
        let authorizer = Authorizer::new(platform.clone(), locator.clone(), config.io_timeout);

        // Index the storyteller role before the moderator role exists.
        assert!(authorizer.authorize(storyteller, &n("5")).await);
        assert!(!authorizer.authorize(late, &n("5")).await);

        let moderator = platform.modify(|g| g.add_role("Moderator")).await;
        assert_ok!(platform.add_role(late, moderator).await);
        assert!(authorizer.authorize(late, &n("5")).await);
        assert_eq!(locator.moderator_role().await, Some(moderator));
    }
}
