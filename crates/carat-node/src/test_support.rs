//! Node fixture shared by the admin socket and API tests.

use std::sync::Arc;

use carat_platform::{GuildSnapshot, MemoryPlatform, UserId};
use tempfile::TempDir;

use crate::node::{CaratNode, NodeConfig, NodeState};

pub(crate) struct TestNode {
    pub state: Arc<NodeState>,
    pub storyteller: UserId,
    pub player: UserId,
    pub dir: TempDir,
}

/// A node serving game 12 from a fresh data directory.
pub(crate) async fn test_node() -> TestNode {
    let dir = TempDir::new().unwrap();
    let mut guild = GuildSnapshot::new();
    let games = guild.add_category("Games");
    guild.add_category("Archive");
    guild.add_channel("text-game-12", Some(games));
    guild.add_channel("kibitz-game-12", Some(games));
    let game_role = guild.add_role("Game-12");
    guild.add_role("Kibitz-12");
    let st_role = guild.add_role("ST-12");
    let storyteller = guild.add_member("storyteller", false, &[st_role]);
    let player = guild.add_member("player", false, &[game_role]);
    MemoryPlatform::new(guild)
        .save(dir.path().join("guild.json"))
        .await
        .unwrap();

    let data_dir = dir.path().to_string_lossy().to_string();
    let config = NodeConfig::from_lookup(|key: &str| match key {
        "CARAT_DATA_DIR" => Some(data_dir.clone()),
        _ => None,
    })
    .unwrap();
    let node = CaratNode::new(config).await.unwrap();

    TestNode {
        state: node.state(),
        storyteller,
        player,
        dir,
    }
}
