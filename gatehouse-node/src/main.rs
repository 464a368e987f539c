//! Gatehouse node binary.
//!
//! Loads the node identity, opens its certificate store and keeps the
//! overlay running until interrupted.

use tracing_subscriber::EnvFilter;

use gatehouse_node::cli::Cli;
use gatehouse_node::config::NodeConfig;
use gatehouse_node::node::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Set up logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Gatehouse Node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_cli(&cli);
    let node = Node::new(config).await?;
    node.run().await?;

    Ok(())
}
