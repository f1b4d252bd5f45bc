use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quorumd::config;
use quorumd::error::QuorumError;
use quorumd::node::Node;
use quorumd::shutdown;

#[derive(Parser, Debug)]
#[command(name = "quorumd")]
#[command(version)]
#[command(about = "A single-leader cluster coordination node")]
struct Args {
    /// Path to the cluster roster file
    #[arg(long, short = 'f', default_value = "./config.yaml")]
    conf: PathBuf,

    /// Name of the local node within the roster
    #[arg(long)]
    node: String,
}

#[tokio::main]
async fn main() -> Result<(), QuorumError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = config::cluster_config(&args.conf, &args.node)?;

    tracing::info!(
        node = %config.name,
        listen_addr = %config.listen_addr,
        participants = ?config.participants.keys().collect::<Vec<_>>(),
        "starting quorumd node"
    );

    let shutdown = shutdown::install();
    Node::new(config).run(shutdown).await
}
