//! HTTP implementation of [`MonitorApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::{
    ApiError, Heartbeat, MonitorApi, MonitorId, MonitorInput, MonitorSnapshot, Outage,
    PauseState, Sample, TimeWindow,
};

/// Monitoring API client over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpMonitorApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMonitorApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = if base_url.starts_with("http://") || base_url.starts_with("https://") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", base_url.trim_end_matches('/'))
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_message(&body),
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Fetch a JSON array, tolerating a malformed body or malformed elements.
    async fn send_list<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<Vec<T>, ApiError> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        Ok(decode_list(&bytes, what))
    }
}

#[async_trait]
impl MonitorApi for HttpMonitorApi {
    async fn list_monitors(&self) -> Result<Vec<MonitorSnapshot>, ApiError> {
        self.send_list(self.request(Method::GET, "/api/endpoints"), "monitors")
            .await
    }

    async fn list_outages(&self, id: &MonitorId, limit: usize) -> Result<Vec<Outage>, ApiError> {
        let path = format!("/api/endpoints/{}/outages", id);
        self.send_list(self.request(Method::GET, &path).query(&[("limit", limit)]), "outages")
            .await
    }

    async fn list_samples(
        &self,
        id: &MonitorId,
        range: TimeWindow,
    ) -> Result<Vec<Sample>, ApiError> {
        let path = format!("/api/endpoints/{}/stats", id);
        self.send_list(
            self.request(Method::GET, &path).query(&[("range", range.as_str())]),
            "samples",
        )
        .await
    }

    async fn list_heartbeats(
        &self,
        id: &MonitorId,
        limit: usize,
    ) -> Result<Vec<Heartbeat>, ApiError> {
        let path = format!("/api/endpoints/{}/heartbeats", id);
        self.send_list(self.request(Method::GET, &path).query(&[("limit", limit)]), "heartbeats")
            .await
    }

    async fn create_monitor(&self, input: &MonitorInput) -> Result<MonitorSnapshot, ApiError> {
        self.send_json(self.request(Method::POST, "/api/endpoints").json(input))
            .await
    }

    async fn update_monitor(
        &self,
        id: &MonitorId,
        input: &MonitorInput,
    ) -> Result<MonitorSnapshot, ApiError> {
        let path = format!("/api/endpoints/{}", id);
        self.send_json(self.request(Method::PUT, &path).json(input))
            .await
    }

    async fn delete_monitor(&self, id: &MonitorId) -> Result<(), ApiError> {
        let path = format!("/api/endpoints/{}", id);
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn toggle_pause(&self, id: &MonitorId) -> Result<PauseState, ApiError> {
        let path = format!("/api/endpoints/{}/toggle-pause", id);
        self.send_json(self.request(Method::POST, &path)).await
    }
}

fn map_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else if e.is_decode() {
        ApiError::Decode(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

/// Decode a list body element by element.
///
/// Anything that is not a JSON array reads as an empty list, and elements
/// that fail to decode are skipped.
fn decode_list<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Vec<T> {
    let items = match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(other) => {
            if !other.is_null() {
                tracing::warn!("Expected a list of {}, got {}", what, type_name(&other));
            }
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("Unreadable list of {}: {}", what, e);
            return Vec::new();
        }
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("Skipping malformed {} entry: {}", what, e);
                None
            }
        })
        .collect();

    if decoded.len() < total {
        tracing::warn!("Skipped {} of {} malformed {}", total - decoded.len(), total, what);
    }
    decoded
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Pull a human readable message out of an error body.
///
/// The API reports errors as `{"error": "..."}` or `{"message": "..."}`;
/// anything else is passed through as plain text.
fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    body.trim().to_string()
}
