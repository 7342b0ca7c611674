//! One game's town square record.
//!
//! Only the seating is typed. Nomination and vote state belongs to the
//! voting front end and is carried as an opaque JSON value.

use carat_platform::UserId;
use serde::{Deserialize, Serialize};

/// A seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: UserId,
    /// Name shown in the town square
    pub alias: String,
}

/// Town square state for one game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TownSquare {
    pub players: Vec<Player>,
    #[serde(default)]
    pub votes: serde_json::Value,
}

impl TownSquare {
    /// Seat `players` in order.
    pub fn new<I, S>(players: I) -> Self
    where
        I: IntoIterator<Item = (UserId, S)>,
        S: Into<String>,
    {
        Self {
            players: players
                .into_iter()
                .map(|(id, alias)| Player {
                    id,
                    alias: alias.into(),
                })
                .collect(),
            votes: serde_json::Value::Null,
        }
    }

    pub fn is_seated(&self, user: UserId) -> bool {
        self.players.iter().any(|p| p.id == user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn players_are_seated_in_order() {
        let square = TownSquare::new([(UserId(2), "bob"), (UserId(1), "alice")]);
        let aliases: Vec<_> = square.players.iter().map(|p| p.alias.as_str()).collect();
        assert_eq!(aliases, ["bob", "alice"]);
        assert!(square.is_seated(UserId(1)));
        assert!(!square.is_seated(UserId(3)));
    }

    #[test]
    fn vote_state_is_optional_on_disk() {
        let square: TownSquare =
            serde_json::from_str(r#"{"players":[{"id":7,"alias":"eve"}]}"#).unwrap();
        assert!(square.is_seated(UserId(7)));
        assert!(square.votes.is_null());
    }
}
