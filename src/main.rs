use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use kobuki_udp_bridge::cli::Cli;

// Single-threaded: one control loop, no worker threads
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = kobuki_udp_bridge::runtime::run(config).await {
        error!("Bridge error: {}", e);
        std::process::exit(1);
    }
}
