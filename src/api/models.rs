//! Data shapes returned by the monitoring API.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix marking a locally created record that the server has not seen yet.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Identifier of a monitor.
///
/// The API hands out numeric ids, but the dashboard also needs synthetic ids
/// for unsaved records, so ids are kept as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MonitorId(pub String);

impl MonitorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a synthetic id for an optimistic record.
    pub fn temporary() -> Self {
        let suffix: u32 = rand::random();
        Self(format!(
            "{}{}-{:08x}",
            TEMP_ID_PREFIX,
            Utc::now().timestamp_millis(),
            suffix
        ))
    }

    /// True if this id was generated locally and never persisted.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MonitorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Str(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => MonitorId(n.to_string()),
            RawId::Str(s) => MonitorId(s),
        })
    }
}

/// Health of a monitor as reported by the probing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorStatus {
    Up,
    Down,
    #[default]
    #[serde(other)]
    Pending,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "UP"),
            MonitorStatus::Down => write!(f, "DOWN"),
            MonitorStatus::Pending => write!(f, "PENDING"),
        }
    }
}

/// A monitored endpoint as last seen by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub id: MonitorId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: MonitorStatus,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub current_response: Option<f64>,
    #[serde(default)]
    pub uptime_24h: Option<f64>,
    /// Probe interval in seconds, when the API reports it.
    #[serde(default)]
    pub check_interval: Option<u64>,
}

impl MonitorSnapshot {
    /// Build the optimistic placeholder shown while a create call is in flight.
    pub fn temporary(input: &MonitorInput) -> Self {
        Self {
            id: MonitorId::temporary(),
            name: input.name.clone(),
            url: input.url.clone(),
            status: MonitorStatus::Pending,
            paused: false,
            current_response: None,
            uptime_24h: None,
            check_interval: input.check_interval,
        }
    }
}

/// Body for create and update calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorInput {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<u64>,
}

/// Pause state returned by the toggle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseState {
    pub paused: bool,
}

/// One response-time sample. Aggregated samples carry min/max and the
/// number of raw probes folded into them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub status: MonitorStatus,
    #[serde(default)]
    pub min_response_time: Option<f64>,
    #[serde(default)]
    pub max_response_time: Option<f64>,
    #[serde(default)]
    pub data_points: Option<u64>,
}

/// A contiguous interval during which a monitor was down.
/// `ended_at == None` means the outage is still ongoing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outage {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// One discrete probe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MonitorStatus,
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Visible range of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeWindow {
    #[serde(rename = "3h")]
    ThreeHours,
    #[serde(rename = "6h")]
    SixHours,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "1w")]
    Week,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 4] = [
        TimeWindow::ThreeHours,
        TimeWindow::SixHours,
        TimeWindow::Day,
        TimeWindow::Week,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::ThreeHours => "3h",
            TimeWindow::SixHours => "6h",
            TimeWindow::Day => "24h",
            TimeWindow::Week => "1w",
        }
    }

    pub fn duration(&self) -> ChronoDuration {
        match self {
            TimeWindow::ThreeHours => ChronoDuration::hours(3),
            TimeWindow::SixHours => ChronoDuration::hours(6),
            TimeWindow::Day => ChronoDuration::hours(24),
            TimeWindow::Week => ChronoDuration::weeks(1),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeWindow::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| format!("unknown time window: {}", s))
    }
}
