//! Web server module.

mod handlers;

use crate::config::ServerConfig;
use crate::dashboard::Dashboard;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
}

/// Local HTTP surface over the synchronized view state.
pub struct Server {
    port: u16,
    state: AppState,
}

impl Server {
    pub fn new(config: &ServerConfig, dashboard: Arc<Dashboard>) -> Self {
        Self {
            port: config.http_port,
            state: AppState { dashboard },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `shutdown` fires.
    pub async fn start(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        // Pages
        .route("/", get(handlers::handle_index))
        .route("/health", get(handlers::handle_health))
        // Dashboard
        .route("/api/dashboard", get(handlers::handle_dashboard))
        .route("/api/refresh", post(handlers::handle_refresh))
        .route("/api/status", get(handlers::handle_status))
        // Writes
        .route("/api/monitors", post(handlers::handle_create_monitor))
        .route(
            "/api/monitors/{id}",
            put(handlers::handle_update_monitor).delete(handlers::handle_delete_monitor),
        )
        .route("/api/monitors/{id}/pause", post(handlers::handle_toggle_pause))
        .route(
            "/api/edit-session",
            get(handlers::handle_get_edit_session)
                .post(handlers::handle_open_edit_session)
                .delete(handlers::handle_cancel_edit_session),
        )
        // Widgets
        .route("/api/monitors/{id}/chart", get(handlers::handle_chart))
        .route("/api/monitors/{id}/heartbeats", get(handlers::handle_heartbeats))
        // Settings
        .route(
            "/api/settings",
            get(handlers::handle_get_settings).put(handlers::handle_update_settings),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}
