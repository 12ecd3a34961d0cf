//! # Shard Commit Node
//!
//! Runs one process of a sharded transaction-commit cluster over TCP.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file named by `SC_CONFIG`, then `SC_*` overrides)
//! 2. Initialize logging and metrics
//! 3. Bind the listening socket
//! 4. Register and start every subsystem
//! 5. Accept frames until Ctrl-C

use anyhow::{Context, Result};
use node_runtime::adapters::{spawn_listener, TcpTransport};
use node_runtime::{Node, NodeConfig, StaticRegistrar};
use sc_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::load().context("failed to load node configuration")?;
    let _telemetry = init_telemetry(&TelemetryConfig::for_node(
        &config.node.alias,
        config.node.index,
    ))
    .context("failed to initialize telemetry")?;

    info!("===========================================");
    info!("  Shard Commit Node v{}", env!("CARGO_PKG_VERSION"));
    info!("  Shard {} / index {}", config.node.alias, config.node.index);
    info!("===========================================");

    let address = format!("{}:{}", config.node.host, config.node.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    let registrar = StaticRegistrar::new(config.peers.clone());
    let node = Node::start(&config, &registrar, Arc::new(TcpTransport::new()))
        .context("failed to start node")?;
    let listener = spawn_listener(listener, node.link().clone());
    info!("Listening on {}", address);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutting down {}", node.process());
    listener.abort();
    node.shutdown();
    for (account, balance) in node.balances() {
        info!("[ledger] {} = {}", account, balance);
    }
    if let Ok(metrics) = encode_metrics() {
        debug!("{}", metrics);
    }
    Ok(())
}
