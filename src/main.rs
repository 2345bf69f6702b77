use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod llm;
mod pipeline;
mod t2q;
mod util;
mod web;

#[cfg(test)]
mod test_support;

use crate::config::{AppConfig, CliArgs};
use crate::pipeline::registry::PipelineRegistry;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Using T2Q service at {} (icl_type: {})",
        config.translator.base_url, config.translator.icl_type
    );
    info!(
        "Using completion endpoint {} with model {}",
        config.llm.api_url, config.llm.model
    );

    let registry = PipelineRegistry::from_config(&config)?;
    info!("Registered {} pipelines", registry.len());

    // Connect every pipeline's database
    registry.on_startup().await;

    let app_state = Arc::new(AppState::new(config.clone(), registry));

    // Start the web server
    info!("Starting pipelines server on {}:{}", config.web.host, config.web.port);
    let result = web::run_server(config.web, Arc::clone(&app_state)).await;

    app_state.registry.on_shutdown().await;

    match result {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
