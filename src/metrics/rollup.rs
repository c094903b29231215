//! Dashboard-level rollups and the merged outage feed.

use serde::Serialize;

use crate::api::{MonitorId, MonitorSnapshot, MonitorStatus, Outage};

use super::{mean, or_zero};

/// Monitors below this 24h uptime (percent) need attention.
pub const ATTENTION_UPTIME_PERCENT: f64 = 95.0;

/// Monitors slower than this (ms) need attention.
pub const ATTENTION_RESPONSE_MS: f64 = 2000.0;

/// Number of outages shown on the dashboard.
pub const DASHBOARD_OUTAGE_CAP: usize = 20;

/// Summary numbers for the dashboard header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardRollup {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub paused: usize,
    /// Mean current response time over active monitors that are up.
    pub avg_response_time: f64,
    /// Mean 24h uptime over active monitors.
    pub overall_uptime: f64,
    pub attention: Vec<MonitorSnapshot>,
}

/// True if an active monitor is down, flaky or slow.
pub fn needs_attention(m: &MonitorSnapshot) -> bool {
    !m.paused
        && (m.status == MonitorStatus::Down
            || or_zero(m.uptime_24h) < ATTENTION_UPTIME_PERCENT
            || or_zero(m.current_response) > ATTENTION_RESPONSE_MS)
}

pub fn compute_rollup(monitors: &[MonitorSnapshot]) -> DashboardRollup {
    let active = || monitors.iter().filter(|m| !m.paused);
    let up_set = || active().filter(|m| m.status == MonitorStatus::Up);

    DashboardRollup {
        total: monitors.len(),
        up: up_set().count(),
        down: active().filter(|m| m.status == MonitorStatus::Down).count(),
        paused: monitors.iter().filter(|m| m.paused).count(),
        avg_response_time: mean(up_set().map(|m| or_zero(m.current_response))),
        overall_uptime: mean(active().map(|m| or_zero(m.uptime_24h))),
        attention: monitors
            .iter()
            .filter(|m| needs_attention(m))
            .cloned()
            .collect(),
    }
}

/// An outage tagged with the monitor it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorOutage {
    pub monitor_id: MonitorId,
    pub monitor_name: String,
    #[serde(flatten)]
    pub outage: Outage,
}

/// Concatenate per-monitor outage lists, most recent first, capped at `cap`.
///
/// Ties on `started_at` are broken by monitor id, then by fetch order.
pub fn merge_outages(
    per_monitor: &[(MonitorSnapshot, Vec<Outage>)],
    cap: usize,
) -> Vec<MonitorOutage> {
    let mut merged: Vec<MonitorOutage> = per_monitor
        .iter()
        .flat_map(|(monitor, outages)| {
            outages.iter().map(move |o| MonitorOutage {
                monitor_id: monitor.id.clone(),
                monitor_name: monitor.name.clone(),
                outage: o.clone(),
            })
        })
        .collect();

    // Stable sort keeps fetch order for full ties.
    merged.sort_by(|a, b| {
        b.outage
            .started_at
            .cmp(&a.outage.started_at)
            .then_with(|| a.monitor_id.cmp(&b.monitor_id))
    });
    merged.truncate(cap);
    merged
}
