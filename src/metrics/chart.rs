//! Chart-ready view models.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::api::{Heartbeat, MonitorStatus, Outage, Sample, TimeWindow};

use super::{
    chart_window, detect_gaps, expected_interval_ms, mean, outage_windows, sample_time_domain,
    sanitize_float, value_domain, visible_overlays, Overlay,
};

/// Where the shaded windows of a chart came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlaySource {
    Outages,
    Gaps,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub timestamp: i64,
    pub label: String,
    pub response_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub status: MonitorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub range: TimeWindow,
    pub points: Vec<ChartPoint>,
    pub time_domain: (f64, f64),
    pub value_domain: (f64, f64),
    pub overlay_source: OverlaySource,
    pub overlays: Vec<Overlay>,
    pub avg_response_time: f64,
}

/// Inputs for [`build_chart`].
#[derive(Debug, Clone, Copy)]
pub struct ChartInput<'a> {
    pub range: TimeWindow,
    pub samples: &'a [Sample],
    /// `None` when no outage feed is available; gaps are inferred instead.
    pub outages: Option<&'a [Outage]>,
    pub check_interval: Option<u64>,
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
}

pub fn build_chart(input: ChartInput<'_>) -> ChartView {
    // The stats endpoint may hand back buckets older than the selected range.
    let window_start = input.now - input.range.duration();
    let in_range: Vec<Sample> = input
        .samples
        .iter()
        .filter(|s| s.created_at >= window_start)
        .cloned()
        .collect();

    let (overlay_source, samples, overlays) = match input.outages {
        Some(outages) => {
            let overlays = match chart_window(&in_range) {
                Some((start, end)) => {
                    visible_overlays(outage_windows(outages, input.now), start, end)
                }
                None => Vec::new(),
            };
            (OverlaySource::Outages, in_range, overlays)
        }
        None => {
            let interval = expected_interval_ms(input.check_interval, &in_range).unwrap_or(0);
            let (gaps, kept) = detect_gaps(&in_range, interval);
            (OverlaySource::Gaps, kept, gaps)
        }
    };

    let label_format = match input.range {
        TimeWindow::Week => "%m-%d %H:%M",
        _ => "%H:%M",
    };

    let points: Vec<ChartPoint> = samples
        .iter()
        .map(|s| ChartPoint {
            timestamp: s.created_at.timestamp_millis(),
            label: s
                .created_at
                .with_timezone(&input.offset)
                .format(label_format)
                .to_string(),
            response_time: sanitize_float(s.response_time.unwrap_or(0.0)),
            min: s.min_response_time.map(sanitize_float),
            max: s.max_response_time.map(sanitize_float),
            status: s.status,
        })
        .collect();

    ChartView {
        range: input.range,
        time_domain: sample_time_domain(&samples),
        value_domain: value_domain(&samples),
        avg_response_time: mean(points.iter().map(|p| p.response_time)),
        overlay_source,
        overlays,
        points,
    }
}

/// Recent heartbeats, oldest first, for the status strip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatStrip {
    pub beats: Vec<Heartbeat>,
    /// Share of beats that were up, in percent.
    pub up_ratio: f64,
    pub last_status: Option<MonitorStatus>,
}

pub fn heartbeat_strip(heartbeats: &[Heartbeat]) -> HeartbeatStrip {
    let mut beats = heartbeats.to_vec();
    beats.sort_by_key(|b| b.created_at);

    let up_ratio = if beats.is_empty() {
        0.0
    } else {
        let up = beats.iter().filter(|b| b.status == MonitorStatus::Up).count();
        up as f64 * 100.0 / beats.len() as f64
    };

    HeartbeatStrip {
        last_status: beats.last().map(|b| b.status),
        up_ratio,
        beats,
    }
}
