use anyhow::Result;
use log::{error, info};
use std::time::Duration;
use tokio::sync::broadcast;

use dess_bridge::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    dess_bridge::init_logging();
    info!(
        "dess-bridge {} starting with config file: {}",
        dess_bridge::CARGO_PKG_VERSION,
        options.config_file
    );

    let config = ConfigWrapper::new(options.config_file.clone()).unwrap_or_else(|err| {
        error!("Failed to load config: {:?}", err);
        std::process::exit(255);
    });
    dess_bridge::set_log_level(&config.loglevel());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        let _ = shutdown_tx_clone.send(());
    });

    if let Some(secs) = options.runtime {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("runtime limit of {}s reached", secs);
            let _ = shutdown_tx_clone.send(());
        });
    }

    if let Err(e) = dess_bridge::app(options, config, shutdown_rx).await {
        error!("Application error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
