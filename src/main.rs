//! # Calendar Connect Entry Point

use std::sync::Arc;

use anyhow::Context;
use calendar_connect::{
    config::ConfigLoader,
    server::{AppState, run_server},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let (config, env) = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;

    init_tracing(&config).context("failed to initialize tracing")?;

    tracing::info!(
        profile = %config.profile,
        log_format = %config.log_format,
        oauth_state_check = config.oauth_state.check,
        cors_origins = config.frontend_origins.len(),
        dotenv_keys = env.file_keys().count(),
        "Loaded configuration"
    );

    let state = AppState::new(config, Arc::new(env)).context("failed to build HTTP client")?;
    run_server(state).await
}
