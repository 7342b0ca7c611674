//! Naming convention binding session numbers to platform resources.
//!
//! A session owns no database row; its channels and roles are found by
//! name. Every bound resource is `<prefix><number>`, matched with a
//! case-insensitive prefix and an exact number, so `Game-1` never matches
//! game `12`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::SessionNumber;

/// Kinds of resources bound to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    GameChannel,
    KibitzChannel,
    PlayerRole,
    SpectatorRole,
    StorytellerRole,
    ArchiveCategory,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GameChannel => "game channel",
            Self::KibitzChannel => "kibitz channel",
            Self::PlayerRole => "player role",
            Self::SpectatorRole => "spectator role",
            Self::StorytellerRole => "storyteller role",
            Self::ArchiveCategory => "archive category",
        };
        f.write_str(name)
    }
}

/// Name prefixes for session-bound resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConvention {
    pub game_channel_prefix: String,
    pub kibitz_channel_prefix: String,
    pub player_role_prefix: String,
    pub spectator_role_prefix: String,
    pub storyteller_role_prefix: String,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            game_channel_prefix: "text-game-".to_string(),
            kibitz_channel_prefix: "kibitz-game-".to_string(),
            player_role_prefix: "Game-".to_string(),
            spectator_role_prefix: "Kibitz-".to_string(),
            storyteller_role_prefix: "ST-".to_string(),
        }
    }
}

impl NamingConvention {
    /// Prefix for a session-bound kind. `None` for the archive category,
    /// which is shared by every session.
    pub fn prefix(&self, kind: ResourceKind) -> Option<&str> {
        match kind {
            ResourceKind::GameChannel => Some(&self.game_channel_prefix),
            ResourceKind::KibitzChannel => Some(&self.kibitz_channel_prefix),
            ResourceKind::PlayerRole => Some(&self.player_role_prefix),
            ResourceKind::SpectatorRole => Some(&self.spectator_role_prefix),
            ResourceKind::StorytellerRole => Some(&self.storyteller_role_prefix),
            ResourceKind::ArchiveCategory => None,
        }
    }

    /// Canonical resource name for a session.
    pub fn name_for(&self, kind: ResourceKind, session: &SessionNumber) -> Option<String> {
        self.prefix(kind).map(|p| format!("{}{}", p, session))
    }

    /// Canonical game channel name, used when recycling the slot.
    pub fn game_channel_name(&self, session: &SessionNumber) -> String {
        format!("{}{}", self.game_channel_prefix, session)
    }

    /// Session a resource name binds to, if it follows the convention.
    pub fn session_of(&self, kind: ResourceKind, name: &str) -> Option<SessionNumber> {
        let prefix = self.prefix(kind)?;
        let head = name.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        SessionNumber::parse(&name[prefix.len()..])
            .ok()
            .filter(|n| n.as_str() == &name[prefix.len()..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> SessionNumber {
        SessionNumber::parse(s).unwrap()
    }

    #[test]
    fn default_names() {
        let naming = NamingConvention::default();
        let twelve = n("12");
        assert_eq!(
            naming.name_for(ResourceKind::GameChannel, &twelve).unwrap(),
            "text-game-12"
        );
        assert_eq!(
            naming.name_for(ResourceKind::KibitzChannel, &twelve).unwrap(),
            "kibitz-game-12"
        );
        assert_eq!(naming.name_for(ResourceKind::PlayerRole, &twelve).unwrap(), "Game-12");
        assert_eq!(
            naming.name_for(ResourceKind::SpectatorRole, &twelve).unwrap(),
            "Kibitz-12"
        );
        assert_eq!(naming.name_for(ResourceKind::StorytellerRole, &twelve).unwrap(), "ST-12");
        assert_eq!(naming.name_for(ResourceKind::ArchiveCategory, &twelve), None);
    }

    #[test]
    fn parses_exact_numbers_only() {
        let naming = NamingConvention::default();
        assert_eq!(
            naming.session_of(ResourceKind::GameChannel, "text-game-12"),
            Some(n("12"))
        );
        assert_eq!(
            naming.session_of(ResourceKind::PlayerRole, "game-7"),
            Some(n("7"))
        );
        assert_eq!(naming.session_of(ResourceKind::GameChannel, "text-game-"), None);
        assert_eq!(naming.session_of(ResourceKind::GameChannel, "text-game-12 "), None);
        assert_eq!(
            naming.session_of(
                ResourceKind::GameChannel,
                "text-game-12 Archived on Mon, 19 Oct 2026 18 00 00"
            ),
            None
        );
        assert_eq!(naming.session_of(ResourceKind::KibitzChannel, "text-game-12"), None);
        // Multi-byte names shorter than the prefix must not panic.
        assert_eq!(naming.session_of(ResourceKind::PlayerRole, "Gä"), None);
    }

    #[test]
    fn one_never_matches_twelve() {
        let naming = NamingConvention::default();
        let parsed = naming.session_of(ResourceKind::PlayerRole, "Game-12").unwrap();
        assert_ne!(parsed, n("1"));
    }
}
