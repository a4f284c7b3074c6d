// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Parser;
use historic_overlay_node::{
    analysis::TaskDispatcher, api::start_server, cli::Cli, config::NodeConfig, version,
};
use std::env;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    info!("Starting {}", version::get_version_string());

    let mut config = NodeConfig::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    if cli.check_config {
        info!(
            "Configuration OK: bind={}, moondream={}, vision={}, overlay={}",
            config.bind_addr(),
            config.moondream_endpoint,
            config.google_vision_endpoint,
            config.debug_overlay
        );
        return Ok(());
    }

    if !config.has_any_credentials() {
        warn!("No backend credentials configured; only local backends will answer");
    }

    let dispatcher = TaskDispatcher::from_config(&config)?;
    info!(
        "Dispatcher ready: {} task kinds, request deadline {}s, debug overlay {}",
        dispatcher.registry().len(),
        config.request_timeout_secs,
        if dispatcher.overlay_enabled() { "on" } else { "off" }
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    start_server(&config, dispatcher, shutdown).await?;

    info!("Node stopped");
    Ok(())
}
