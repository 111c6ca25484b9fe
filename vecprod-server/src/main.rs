//! vecprod server binary.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vecprod_server::ServerConfig;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::parse();

    let exit_code = match vecprod_server::run::run(config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("server error: {:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}
