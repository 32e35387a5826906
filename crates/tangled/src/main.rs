//! tangled - Tangle node daemon
//!
//! Admits peers within the configured follow distance, serves them blob
//! replication, and shuts down in stages on Ctrl-C.

use clap::Parser;
use std::process::ExitCode;
use tangled::config::Config;
use tangled::node::{Node, NodeOptions};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.log_directive().parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let node = Node::open(NodeOptions::from(&config))?;
    let addr = node.listen(config.listen).await?;
    info!("Serving {} on {}", node.feed(), addr);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received shutdown signal");
        }
        _ = node.stopped() => {}
    }

    node.shutdown();
    node.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e:#}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    info!("tangled v{} - Tangle node daemon", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Node error: {:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
