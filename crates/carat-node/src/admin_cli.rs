//! carat-admin CLI tool
//!
//! Runs game lifecycle commands on a Carat node.
//!
//! Usage:
//!   carat-admin open-kibitz <actor_id> <game> [channel_id]
//!   carat-admin close-kibitz <actor_id> <game> [channel_id]
//!   carat-admin end-game <actor_id> <game> [channel_id]
//!   carat-admin archive-game <actor_id> <game> [channel_id]
//!   carat-admin session-state <game>
//!   carat-admin list-sessions
//!   carat-admin list-archive
//!   carat-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    OpenKibitz { actor: u64, game: String, channel: Option<u64> },
    CloseKibitz { actor: u64, game: String, channel: Option<u64> },
    EndGame { actor: u64, game: String, channel: Option<u64> },
    ArchiveGame { actor: u64, game: String, channel: Option<u64> },
    SessionState { game: String },
    ListSessions,
    ListArchive,
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Error { error: String },
    Transition { report: serde_json::Value },
    Session { game: String, state: String, generation: u64 },
    List { items: Vec<String> },
    Pong,
}

fn print_usage() {
    eprintln!("carat-admin - Run game lifecycle commands on a Carat node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  carat-admin open-kibitz <actor_id> <game> [channel_id]   Open kibitz to everyone");
    eprintln!("  carat-admin close-kibitz <actor_id> <game> [channel_id]  Close kibitz");
    eprintln!("  carat-admin end-game <actor_id> <game> [channel_id]      End a game");
    eprintln!("  carat-admin archive-game <actor_id> <game> [channel_id]  Archive a game's channel");
    eprintln!("  carat-admin session-state <game>                         Show a game's state");
    eprintln!("  carat-admin list-sessions                                List games");
    eprintln!("  carat-admin list-archive                                 List archived channels");
    eprintln!("  carat-admin ping                                         Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CARAT_SOCKET  Path to admin socket (default: ./carat-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("CARAT_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./carat-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to carat-node at {:?}: {}\n\
             Is the carat-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

/// Parse `<actor_id> <game> [channel_id]`.
fn transition_args(name: &str, args: &[String]) -> (u64, String, Option<u64>) {
    if args.len() < 2 {
        fail(&format!("{} requires <actor_id> and <game> arguments", name));
    }
    let actor = args[0]
        .parse()
        .unwrap_or_else(|_| fail(&format!("actor_id must be a number, got {:?}", args[0])));
    let channel = args.get(2).map(|c| {
        c.parse()
            .unwrap_or_else(|_| fail(&format!("channel_id must be a number, got {:?}", c)))
    });
    (actor, args[1].clone(), channel)
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let rest = &args[2..];
    let cmd = match args[1].as_str() {
        "open-kibitz" => {
            let (actor, game, channel) = transition_args("open-kibitz", rest);
            AdminCommand::OpenKibitz { actor, game, channel }
        }
        "close-kibitz" => {
            let (actor, game, channel) = transition_args("close-kibitz", rest);
            AdminCommand::CloseKibitz { actor, game, channel }
        }
        "end-game" => {
            let (actor, game, channel) = transition_args("end-game", rest);
            AdminCommand::EndGame { actor, game, channel }
        }
        "archive-game" => {
            let (actor, game, channel) = transition_args("archive-game", rest);
            AdminCommand::ArchiveGame { actor, game, channel }
        }
        "session-state" => {
            let Some(game) = rest.first() else {
                fail("session-state requires a <game> argument");
            };
            AdminCommand::SessionState { game: game.clone() }
        }
        "list-sessions" => AdminCommand::ListSessions,
        "list-archive" => AdminCommand::ListArchive,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Transition { report } => {
                match serde_json::to_string_pretty(&report) {
                    Ok(pretty) => println!("{}", pretty),
                    Err(_) => println!("{}", report),
                }
            }
            AdminResponse::Session {
                game,
                state,
                generation,
            } => {
                println!("game {}: {} (slot generation {})", game, state, generation);
            }
            AdminResponse::List { items } => {
                if items.is_empty() {
                    println!("(none)");
                } else {
                    for item in items {
                        println!("{}", item);
                    }
                }
            }
            AdminResponse::Pong => {
                println!("pong - carat-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
