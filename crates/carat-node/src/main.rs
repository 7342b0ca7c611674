//! Carat Node binary
//!
//! Hosts Blood on the Clocktower games on an in-memory guild.

use carat_node::{CaratNode, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carat_node=info,carat_lifecycle=info,carat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Carat Node");

    let config = NodeConfig::from_env()?;

    let node = CaratNode::new(config).await?;
    node.run().await?;

    Ok(())
}
