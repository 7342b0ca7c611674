//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for running lifecycle commands on behalf of
//! a member and inspecting sessions and the archive.

use crate::error::Result;
use crate::node::NodeState;
use carat_lifecycle::{Invocation, Operation, SessionNumber, SessionState, TransitionReport};
use carat_platform::{ChannelId, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Open kibitz to the public
    OpenKibitz {
        actor: u64,
        game: String,
        #[serde(default)]
        channel: Option<u64>,
    },
    /// Close kibitz
    CloseKibitz {
        actor: u64,
        game: String,
        #[serde(default)]
        channel: Option<u64>,
    },
    /// End a game
    EndGame {
        actor: u64,
        game: String,
        #[serde(default)]
        channel: Option<u64>,
    },
    /// Archive a game's channel
    ArchiveGame {
        actor: u64,
        game: String,
        #[serde(default)]
        channel: Option<u64>,
    },
    /// Lifecycle state of one game
    SessionState { game: String },
    /// Games with a live game channel
    ListSessions,
    /// Archived channels, oldest first
    ListArchive,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Error { error: String },
    Transition { report: TransitionReport },
    Session { game: String, state: SessionState, generation: u64 },
    List { items: Vec<String> },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(state: Arc<NodeState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<NodeState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &state).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, state: &NodeState) -> AdminResponse {
    match cmd {
        AdminCommand::OpenKibitz { actor, game, channel } => {
            transition(state, Operation::OpenKibitz, actor, &game, channel).await
        }
        AdminCommand::CloseKibitz { actor, game, channel } => {
            transition(state, Operation::CloseKibitz, actor, &game, channel).await
        }
        AdminCommand::EndGame { actor, game, channel } => {
            transition(state, Operation::EndGame, actor, &game, channel).await
        }
        AdminCommand::ArchiveGame { actor, game, channel } => {
            transition(state, Operation::ArchiveGame, actor, &game, channel).await
        }

        AdminCommand::SessionState { game } => {
            let session = match SessionNumber::parse(&game) {
                Ok(session) => session,
                Err(e) => return AdminResponse::Error { error: e.to_string() },
            };
            match state.lifecycle.session_state(&session).await {
                Ok(record) => AdminResponse::Session {
                    game: session.to_string(),
                    state: record.state,
                    generation: record.generation,
                },
                Err(e) => AdminResponse::Error { error: e.to_string() },
            }
        }

        AdminCommand::ListSessions => {
            if let Err(e) = state.lifecycle.locator().refresh().await {
                return AdminResponse::Error { error: e.to_string() };
            }
            let items = state
                .lifecycle
                .locator()
                .sessions()
                .await
                .into_iter()
                .map(|s| s.to_string())
                .collect();
            AdminResponse::List { items }
        }

        AdminCommand::ListArchive => {
            let items = state
                .lifecycle
                .archive_entries()
                .await
                .into_iter()
                .map(|e| format!("{}\t{}", e.channel, e.name))
                .collect();
            AdminResponse::List { items }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

async fn transition(
    state: &NodeState,
    operation: Operation,
    actor: u64,
    game: &str,
    channel: Option<u64>,
) -> AdminResponse {
    let session = match SessionNumber::parse(game) {
        Ok(session) => session,
        Err(e) => return AdminResponse::Error { error: e.to_string() },
    };
    let mut invocation = Invocation::new(UserId(actor), session);
    if let Some(channel) = channel {
        invocation = invocation.replying_in(ChannelId(channel));
    }

    let result = state.lifecycle.execute(operation, &invocation).await;

    // Failed transitions may still have applied steps.
    let denied = matches!(&result, Err(e) if e.is_denied());
    if !denied {
        if let Err(e) = state.persist_guild().await {
            tracing::error!("Failed to save guild snapshot: {}", e);
        }
    }

    match result {
        Ok(report) => AdminResponse::Transition { report },
        Err(e) => AdminResponse::Error { error: e.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_node;
    use carat_platform::MemoryPlatform;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn command(json: &str) -> AdminCommand {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn commands_parse_from_json_lines() {
        let cmd = command(r#"{"cmd":"end_game","actor":7,"game":"12"}"#);
        assert!(matches!(
            cmd,
            AdminCommand::EndGame { actor: 7, ref game, channel: None } if game == "12"
        ));
        assert!(matches!(command(r#"{"cmd":"ping"}"#), AdminCommand::Ping));
        assert_err!(serde_json::from_str::<AdminCommand>(r#"{"cmd":"reboot"}"#));
    }

    #[tokio::test]
    async fn end_game_runs_and_saves_snapshot() {
        let node = test_node().await;
        let cmd = AdminCommand::EndGame {
            actor: node.storyteller.get(),
            game: "12".into(),
            channel: None,
        };

        match execute_command(cmd, &node.state).await {
            AdminResponse::Transition { report } => {
                assert_eq!(report.state, SessionState::Ended);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let saved = assert_ok!(MemoryPlatform::load(node.dir.path().join("guild.json")).await)
            .snapshot()
            .await;
        let player = saved.member(node.player).unwrap();
        assert_eq!(player.roles.len(), 0);
    }

    #[tokio::test]
    async fn denied_command_reports_error() {
        let node = test_node().await;
        let cmd = AdminCommand::OpenKibitz {
            actor: node.player.get(),
            game: "12".into(),
            channel: None,
        };
        match execute_command(cmd, &node.state).await {
            AdminResponse::Error { error } => assert!(error.contains("not the current storyteller")),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn session_state_and_listings() {
        let node = test_node().await;
        let state = execute_command(AdminCommand::SessionState { game: "12".into() }, &node.state).await;
        assert!(matches!(
            state,
            AdminResponse::Session { state: SessionState::Running, generation: 0, .. }
        ));

        match execute_command(AdminCommand::ListSessions, &node.state).await {
            AdminResponse::List { items } => assert_eq!(items, vec!["12".to_string()]),
            other => panic!("unexpected response: {:?}", other),
        }
        match execute_command(AdminCommand::ListArchive, &node.state).await {
            AdminResponse::List { items } => assert!(items.is_empty()),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn socket_answers_ping() {
        let node = test_node().await;
        let path = node.dir.path().join("test.sock");
        let socket = AdminSocket::new(Arc::clone(&node.state), path.clone());
        tokio::spawn(async move { socket.run().await });

        let mut stream = None;
        for _ in 0..50 {
            match UnixStream::connect(&path).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        let stream = stream.expect("admin socket did not come up");

        let (reader, mut writer) = stream.into_split();
        assert_ok!(writer.write_all(b"{\"cmd\":\"ping\"}\nnot json\n").await);
        let mut lines = BufReader::new(reader).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"{"status":"pong"}"#);
        let error = lines.next_line().await.unwrap().unwrap();
        assert!(error.contains("Invalid command"));
    }
}
