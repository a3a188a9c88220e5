//! Conversion server binary.

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use v2m_server::uploads;
use v2m_server::{create_router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    let config = ServerConfig::from_env();
    info!("Server config: {:?}", config);

    let state = AppState::new(config.clone());

    // Evict upload sessions with no chunk activity
    tokio::spawn(uploads::run_sweeper(
        state.uploads.clone(),
        config.sweep_interval,
    ));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("WebSocket server listening at ws://{}/ws", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await?;

    Ok(())
}
