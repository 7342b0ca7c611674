//! Carat Node - the game host daemon.
//!
//! Architecture:
//! - One in-memory guild, loaded from and saved to a JSON snapshot
//! - One lifecycle manager driving game sessions on that guild
//! - Town square store notified when games end
//! - Unix admin socket for lifecycle commands (carat-admin CLI)
//! - Read-only HTTP status API

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use carat_lifecycle::{Lifecycle, LifecycleConfig};
use carat_platform::{ChatPlatform, MemoryPlatform};
use carat_townsquare::TownSquares;

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};

/// Configuration for a Carat node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for state files
    pub data_dir: PathBuf,

    /// Guild snapshot the in-memory platform is loaded from
    pub guild_snapshot: PathBuf,

    /// Town square store file
    pub town_squares: PathBuf,

    /// Admin socket path (for carat-admin CLI)
    pub admin_socket: PathBuf,

    /// HTTP status API listen address
    pub api_addr: SocketAddr,

    /// Lifecycle settings
    pub lifecycle: LifecycleConfig,
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = PathBuf::from(
            lookup("CARAT_DATA_DIR").unwrap_or_else(|| "./carat-data".to_string()),
        );

        let guild_snapshot = lookup("CARAT_GUILD_SNAPSHOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("guild.json"));

        let town_squares = lookup("CARAT_TOWNSQUARE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("townsquares.json"));

        let admin_socket = lookup("CARAT_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let raw_addr = lookup("CARAT_API_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let api_addr = raw_addr
            .parse()
            .map_err(|_| Error::Config(format!("CARAT_API_ADDR is not an address: {:?}", raw_addr)))?;

        let lifecycle = LifecycleConfig::from_lookup(&lookup)?;

        Ok(Self {
            data_dir,
            guild_snapshot,
            town_squares,
            admin_socket,
            api_addr,
            lifecycle,
        })
    }
}

/// State shared by the admin socket and the API.
pub struct NodeState {
    pub lifecycle: Lifecycle,
    pub platform: Arc<MemoryPlatform>,
    pub town_squares: Arc<TownSquares>,
    pub config: NodeConfig,
}

impl NodeState {
    /// Write the guild back to its snapshot file.
    pub async fn persist_guild(&self) -> Result<()> {
        self.platform.save(&self.config.guild_snapshot).await?;
        Ok(())
    }
}

/// A Carat node instance.
pub struct CaratNode {
    state: Arc<NodeState>,
}

impl CaratNode {
    /// Load state from disk and hydrate the lifecycle manager.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let platform = if tokio::fs::try_exists(&config.guild_snapshot).await? {
            Arc::new(MemoryPlatform::load(&config.guild_snapshot).await?)
        } else {
            tracing::warn!(
                "No guild snapshot at {:?}, starting with an empty server",
                config.guild_snapshot
            );
            Arc::new(MemoryPlatform::default())
        };

        let town_squares = Arc::new(TownSquares::open(&config.town_squares).await?);

        let dyn_platform: Arc<dyn ChatPlatform> = platform.clone();
        let lifecycle = Lifecycle::new(dyn_platform, config.lifecycle.clone())?
            .with_voting(town_squares.clone());
        lifecycle.hydrate().await?;

        Ok(Self {
            state: Arc::new(NodeState {
                lifecycle,
                platform,
                town_squares,
                config,
            }),
        })
    }

    /// Get the shared state.
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts the admin socket and the HTTP API).
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        tracing::info!("Carat node starting");
        tracing::info!("  API: http://{}", config.api_addr);
        tracing::info!("  Admin: {:?}", config.admin_socket);
        tracing::info!("  Guild: {:?}", config.guild_snapshot);
        tracing::info!("  Town squares: {:?}", config.town_squares);

        let admin_socket = AdminSocket::new(self.state(), config.admin_socket.clone());
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let app = api::build_router(self.state());
        let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}
