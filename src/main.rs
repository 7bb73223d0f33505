//! CLI entry point.

use clap::Parser;
use telebroker::supervisor::Supervisor;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "telebroker", about = "Telephony event ingress and fan-out broker")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let supervisor = Supervisor::new(&cli.config);
    if let Err(e) = supervisor.run().await {
        tracing::error!("fatal error: {}", e);
        std::process::exit(1);
    }
}
