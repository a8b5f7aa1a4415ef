/*
 * Megadrome - Swap Engine for the Megadrome DEX on Monad
 * Main entry point for the quote server
 */

use megadrome::{api, config::Config, service::SwapService};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Megadrome Swap Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");

    let swap_service = Arc::new(SwapService::new(config.clone()).await?);

    let api_state = api::ApiState {
        config: config.clone(),
        swap_service,
    };

    info!("Starting API server on {}:{}", config.server.host, config.server.port);

    let rocket = api::create_rocket(api_state);
    rocket.launch().await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "megadrome=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
