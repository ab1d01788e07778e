use anyhow::{Context, Result};
use as_proxy::{DialProxy, ProxyServer, config::load_config};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "An authenticating proxy for the Aerospike admin protocol", long_about = None)]
struct Args {
    /// Listener address
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// Backend server address
    #[arg(short, long, default_value = "127.0.0.1:7000")]
    backend: String,

    /// Configuration file
    #[arg(short, long, default_value = "./as-proxy.yml")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    // Load config; any problem here is fatal
    let config = load_config(&args.config)
        .with_context(|| format!("get config failed: {}", args.config.display()))?;

    // Hash passwords and compile cluster patterns once, up front
    let credentials = config
        .credential_store()
        .context("hash password failed")?;
    let cluster = config.cluster_map()?;
    info!(
        "loaded {} users and {} cluster routes",
        credentials.len(),
        cluster.len()
    );

    // Instantiate server
    let target = DialProxy::new(args.backend)
        .with_dial_timeout(config.connect_timeout())
        .with_keepalive(config.keepalive_period());

    let mut server = ProxyServer::new(args.listen, target)
        .with_credentials(credentials)
        .with_cluster_map(cluster);

    // Run it
    server.run().await?;
    Ok(())
}
