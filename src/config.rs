//! Configuration module for StatusBoard.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::sync::PollerConfig;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the local web server (default: 8080)
    pub http_port: u16,
    /// Base URL of the remote monitoring API (default: "http://localhost:3000")
    pub api_base_url: String,
    /// Static bearer token sent with every API call
    pub api_token: Option<String>,
    /// Endpoint list refresh cadence (default: 30s)
    pub dashboard_interval: Duration,
    /// Per-endpoint chart refresh cadence (default: 20s)
    pub chart_interval: Duration,
    /// Heartbeat strip refresh cadence (default: 30s)
    pub heartbeat_interval: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    /// Outages fetched per monitor on every dashboard pass
    pub outage_limit: usize,
    pub heartbeat_limit: usize,
    /// Widget sessions nobody asked for in this long are torn down
    pub session_idle_timeout: Duration,
    pub utc_offset_minutes: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            api_base_url: "http://localhost:3000".to_string(),
            api_token: None,
            dashboard_interval: Duration::from_secs(30),
            chart_interval: Duration::from_secs(20),
            heartbeat_interval: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_millis(5000),
            request_timeout: Duration::from_secs(10),
            outage_limit: 10,
            heartbeat_limit: 50,
            session_idle_timeout: Duration::from_secs(300),
            utc_offset_minutes: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables (all prefixed `STATUSBOARD_`):
    /// - `HTTP_PORT`, `API_URL`, `API_TOKEN`
    /// - `DASHBOARD_INTERVAL_SECS`, `CHART_INTERVAL_SECS`, `HEARTBEAT_INTERVAL_SECS`
    /// - `RETRY_COUNT`, `RETRY_DELAY_MS`, `REQUEST_TIMEOUT_SECS`
    /// - `OUTAGE_LIMIT`, `HEARTBEAT_LIMIT`, `SESSION_IDLE_SECS`
    /// - `UTC_OFFSET_MINUTES`
    ///
    /// Values that fail to parse are ignored.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let var = |name: &str| lookup(&format!("STATUSBOARD_{}", name));

        if let Some(port) = parse(var("HTTP_PORT")) {
            cfg.http_port = port;
        }
        if let Some(url) = var("API_URL").filter(|u| !u.trim().is_empty()) {
            cfg.api_base_url = url;
        }
        cfg.api_token = var("API_TOKEN").filter(|t| !t.is_empty());

        if let Some(secs) = parse(var("DASHBOARD_INTERVAL_SECS")) {
            cfg.dashboard_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(var("CHART_INTERVAL_SECS")) {
            cfg.chart_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(var("HEARTBEAT_INTERVAL_SECS")) {
            cfg.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(count) = parse(var("RETRY_COUNT")) {
            cfg.retry_count = count;
        }
        if let Some(ms) = parse(var("RETRY_DELAY_MS")) {
            cfg.retry_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse(var("REQUEST_TIMEOUT_SECS")) {
            cfg.request_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = parse(var("OUTAGE_LIMIT")) {
            cfg.outage_limit = limit;
        }
        if let Some(limit) = parse(var("HEARTBEAT_LIMIT")) {
            cfg.heartbeat_limit = limit;
        }
        if let Some(secs) = parse(var("SESSION_IDLE_SECS")) {
            cfg.session_idle_timeout = Duration::from_secs(secs);
        }
        if let Some(minutes) = parse(var("UTC_OFFSET_MINUTES")) {
            cfg.utc_offset_minutes = minutes;
        }

        cfg
    }

    /// Controller configuration for a session refreshing every `interval`.
    pub fn poller_config(&self, interval: Duration) -> PollerConfig {
        PollerConfig {
            interval,
            enabled: true,
            retry_count: self.retry_count,
            retry_delay: self.retry_delay,
            on_error: None,
        }
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_from(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.api_base_url, "http://localhost:3000");
        assert_eq!(cfg.dashboard_interval, Duration::from_secs(30));
        assert_eq!(cfg.chart_interval, Duration::from_secs(20));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.retry_count, 3);
        assert!(cfg.api_token.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let cfg = load_from(&[
            ("STATUSBOARD_HTTP_PORT", "9090"),
            ("STATUSBOARD_API_URL", "https://status.example.com"),
            ("STATUSBOARD_API_TOKEN", "secret"),
            ("STATUSBOARD_CHART_INTERVAL_SECS", "5"),
            ("STATUSBOARD_RETRY_DELAY_MS", "250"),
            ("STATUSBOARD_UTC_OFFSET_MINUTES", "-300"),
        ]);
        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.api_base_url, "https://status.example.com");
        assert_eq!(cfg.api_token.as_deref(), Some("secret"));
        assert_eq!(cfg.chart_interval, Duration::from_secs(5));
        assert_eq!(cfg.retry_delay, Duration::from_millis(250));
        assert_eq!(cfg.utc_offset_minutes, -300);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let cfg = load_from(&[
            ("STATUSBOARD_HTTP_PORT", "not-a-port"),
            ("STATUSBOARD_RETRY_COUNT", "-1"),
            ("STATUSBOARD_API_URL", "  "),
            ("STATUSBOARD_API_TOKEN", ""),
        ]);
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.retry_count, 3);
        assert_eq!(cfg.api_base_url, "http://localhost:3000");
        assert!(cfg.api_token.is_none());
    }

    #[test]
    fn test_poller_config() {
        let cfg = ServerConfig::default();
        let poller = cfg.poller_config(cfg.chart_interval);
        assert_eq!(poller.interval, Duration::from_secs(20));
        assert_eq!(poller.retry_count, 3);
        assert_eq!(poller.retry_delay, Duration::from_secs(5));
        assert!(poller.enabled);
    }
}
