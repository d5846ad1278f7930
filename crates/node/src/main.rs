//! fsnode: storage and liveness agent.
//!
//! Usage:
//!   fsnode <COORDINATOR_ADDR>
//!
//! `COORDINATOR_ADDR` is `host:port` or a full `ws://` / `wss://` URL.
//! Sessions, logs and the `nodeID` file live in the working directory.
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fsn_domain::config::NodeConfig;

#[derive(Debug, Parser)]
#[command(name = "fsnode", about = "Storage and liveness agent for the job coordinator")]
struct Cli {
    /// Coordinator address (`host:port` or `ws://host:port/path`).
    coordinator: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig::builder(cli.coordinator)
        .build()
        .context("invalid configuration")?;

    let node = fsn_node::start(config).await.context("node startup failed")?;
    tracing::info!(
        node_id = %node.ctx.node_id(),
        address = %node.address,
        "node ready"
    );

    // Serve until the process is told to stop.
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    tracing::info!("shutdown signal received, exiting");
    node.abort();
    Ok(())
}
