/// Main entry point for the ingestion pipeline
use std::time::Duration;

use tracing::{info, warn};

use tickspread::{config::load_config, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    let config = load_config(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter.clone())
        .init();

    info!("Starting tick ingestion pipeline...");

    let symbols = config.symbols.clone();
    let pipeline = Pipeline::new(config)?;

    if symbols.is_empty() {
        warn!("No symbols configured - pipeline is idle until streams are started");
    }
    for symbol in &symbols {
        pipeline.start_stream(symbol).await;
    }

    // Periodic health line until Ctrl+C
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received - initiating graceful shutdown");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(30)) => {
                let status = pipeline.status().await;
                info!(
                    "Health: {} active symbols, buffer={}, flusher_alive={}",
                    status.active_symbols.len(),
                    status.buffer_len,
                    status.flusher_alive
                );
            }
        }
    }

    pipeline.shutdown().await;
    Ok(())
}
