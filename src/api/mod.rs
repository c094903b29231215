//! Boundary to the remote monitoring API.
//!
//! The sync core only ever talks to the API through [`MonitorApi`], so the
//! transport can be swapped for a fake in tests.

mod http;
mod models;

pub use http::*;
pub use models::*;

use async_trait::async_trait;
use thiserror::Error;

/// API error types.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("fetch task failed: {0}")]
    Task(String),
}

impl ApiError {
    /// Message suitable for showing to whoever issued a write.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

/// The logical calls the dashboard needs from the monitoring API.
#[async_trait]
pub trait MonitorApi: Send + Sync {
    async fn list_monitors(&self) -> Result<Vec<MonitorSnapshot>, ApiError>;

    async fn list_outages(&self, id: &MonitorId, limit: usize) -> Result<Vec<Outage>, ApiError>;

    async fn list_samples(&self, id: &MonitorId, range: TimeWindow)
        -> Result<Vec<Sample>, ApiError>;

    async fn list_heartbeats(&self, id: &MonitorId, limit: usize)
        -> Result<Vec<Heartbeat>, ApiError>;

    async fn create_monitor(&self, input: &MonitorInput) -> Result<MonitorSnapshot, ApiError>;

    async fn update_monitor(
        &self,
        id: &MonitorId,
        input: &MonitorInput,
    ) -> Result<MonitorSnapshot, ApiError>;

    async fn delete_monitor(&self, id: &MonitorId) -> Result<(), ApiError>;

    async fn toggle_pause(&self, id: &MonitorId) -> Result<PauseState, ApiError>;
}
