//! Gentoro MCP Relay
//!
//! Serves the Model Context Protocol (MCP) over stdio and forwards every
//! request to a Gentoro agent.
//!
//! Usage:
//!   GENTORO_BASE_URL=https://api.gentoro.com \
//!   GENTORO_BRIDGE_UID=<bridge> \
//!   GENTORO_API_KEY=<key> \
//!   gentoro-mcp
//!
//! Logs go to stderr; set RUST_LOG to change verbosity.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use gentoro_mcp::{Config, HttpTransport, RelayServer};

#[tokio::main]
async fn main() {
    // Initialize logging to stderr (stdout is for MCP protocol)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        tracing::error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }

    tracing::info!("Process ended successfully");
    // Dropping the runtime would wait on the blocking stdin read
    std::process::exit(0);
}

async fn run() -> Result<()> {
    let config = Config::from_env();
    tracing::debug!("Loaded {:?}", config);

    let transport = HttpTransport::new(&config).context("Failed to set up Gentoro transport")?;
    tracing::info!("Relaying to {}", transport.mcp_url());

    let mut server = RelayServer::new(transport);
    server
        .start()
        .await
        .context("Capability probe against Gentoro failed")?;
    server.run().await.context("Relay server stopped with an error")?;

    Ok(())
}
