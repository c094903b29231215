//! StatusBoard - live status dashboard
//!
//! Polls a remote monitoring API, keeps the synchronized view in memory and
//! serves the derived view models over HTTP.

mod api;
mod config;
mod dashboard;
mod metrics;
mod settings;
mod sync;
mod web;

use api::HttpMonitorApi;
use config::ServerConfig;
use dashboard::Dashboard;
use settings::{DisplaySettings, SettingsHandle};
use web::Server;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statusboard=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting StatusBoard on port {}...", cfg.http_port);
    tracing::info!("Polling monitoring API at {}", cfg.api_base_url);

    let api = HttpMonitorApi::new(&cfg.api_base_url, cfg.api_token.clone(), cfg.request_timeout)?;

    let initial = DisplaySettings {
        utc_offset_minutes: cfg.utc_offset_minutes,
    };
    if !initial.is_valid() {
        tracing::warn!("Ignoring out-of-range UTC offset {}", cfg.utc_offset_minutes);
    }
    let settings = SettingsHandle::new(DisplaySettings::default());
    settings.update(initial);

    // Start polling
    let dashboard = Arc::new(Dashboard::new(Arc::new(api), cfg.clone(), settings));
    let shutdown = CancellationToken::new();
    dashboard.start_background(shutdown.clone());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down...");
                signal.cancel();
            }
            Err(e) => tracing::warn!("No shutdown signal handler: {}", e),
        }
    });

    // Start web server
    let server = Server::new(&cfg, dashboard.clone());
    server.start(shutdown).await?;

    dashboard.shutdown();
    Ok(())
}
