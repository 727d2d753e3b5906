//! Overlay node binary.
//!
//! ```text
//!  overlay-node [PORT] [PEER_ADDR...]
//!
//!   peers ──dial──┐                       ┌── greeting every interval
//!                 ▼                       │
//!   listener ──► pool ──► dispatch ──► registry ──► inboxes ──► log
//!                 │  (per slot)   handshake │
//!                 └── ID: / ACC / MSG: ─────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use overlay_node::app::App;
use overlay_node::config::loader::{check, load_config};
use overlay_node::config::NodeConfig;
use overlay_node::lifecycle::signals::wait_for_signal;
use overlay_node::observability::{logging, metrics};
use overlay_node::Node;

#[derive(Parser)]
#[command(name = "overlay-node")]
#[command(about = "Minimal peer-to-peer overlay node", long_about = None)]
struct Cli {
    /// Port to listen on; overrides the config file
    port: Option<u16>,

    /// Peers to dial at startup, as host:port
    peers: Vec<String>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level for this crate (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, default_value_t = 1000)]
    greeting_interval_ms: u64,

    #[arg(long, default_value = "Hello!")]
    greeting: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => NodeConfig::default(),
    };
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if !cli.peers.is_empty() {
        config = config.with_dial(cli.peers.clone());
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    let config = check(config)?;

    logging::init_logging(&config.observability.log_level);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let node = Node::new(config)?;
    let address = node.start().await?;
    tracing::info!(peer_id = %node.id(), address = %address, "------ STARTING ------");

    let shutdown = node.shutdown_handle();
    let app = App::new(
        node.clone(),
        cli.greeting.into_bytes(),
        Duration::from_millis(cli.greeting_interval_ms),
    );
    let app_task = tokio::spawn(app.run(shutdown.subscribe()));

    wait_for_signal().await;
    node.shutdown();
    let _ = app_task.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
