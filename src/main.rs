//! Main entry point for the quickshare CLI application.
//!
//! Builds the catalog from the given paths, prints every access URL and
//! serves until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use quickshare::{
    Cli, Config, ServingCatalog, compose_resources, list_addresses, print_access_urls, server,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides -v. Logs go to stderr; stdout carries only URLs.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.into_config()?;
    tracing::debug!("config: {:?}", config);

    // Nothing to share: exit without starting a server
    if config.paths.is_empty() {
        return Ok(());
    }

    run(config).await
}

/// Startup failures abort before the listener is bound.
async fn run(config: Config) -> Result<()> {
    let catalog = ServingCatalog::from_paths(&config.paths)?;
    let addresses = list_addresses(config.public_ip_only).await?;
    let resources = compose_resources(&catalog, config.port, &addresses)?;

    let listener = server::bind(config.port)
        .await
        .with_context(|| format!("failed to listen on port {}", config.port))?;
    print_access_urls(&resources);

    server::serve(listener, Arc::new(catalog), server::shutdown_signal()).await?;
    tracing::debug!("stopped");
    Ok(())
}
