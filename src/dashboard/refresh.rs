//! Fetch routines behind the dashboard's polling sessions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use crate::api::{ApiError, Heartbeat, MonitorApi, MonitorId, MonitorSnapshot, Outage, Sample, TimeWindow};
use crate::sync::FetchSource;

/// One pass of the top-level refresh: the endpoint list plus each endpoint's
/// recent outages, in list order.
#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub monitors: Vec<MonitorSnapshot>,
    pub outages: Vec<(MonitorSnapshot, Vec<Outage>)>,
    /// When the list request went out; `None` until a pass has completed.
    pub fetched_at: Option<DateTime<Utc>>,
}

pub struct DashboardFetch {
    pub api: Arc<dyn MonitorApi>,
    pub outage_limit: usize,
}

#[async_trait]
impl FetchSource<DashboardData> for DashboardFetch {
    async fn fetch(&self) -> Result<DashboardData, ApiError> {
        let fetched_at = Utc::now();
        let monitors = self.api.list_monitors().await?;

        let mut tasks = JoinSet::new();
        for (idx, monitor) in monitors.iter().enumerate() {
            let api = self.api.clone();
            let id = monitor.id.clone();
            let limit = self.outage_limit;
            tasks.spawn(async move { (idx, api.list_outages(&id, limit).await) });
        }

        let mut per_monitor = vec![Vec::new(); monitors.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(outages))) => per_monitor[idx] = outages,
                // One bad outage feed must not blank the whole dashboard.
                Ok((idx, Err(e))) => {
                    tracing::warn!("Outages for monitor {} unavailable: {}", monitors[idx].id, e)
                }
                Err(e) => tracing::warn!("Outage fetch task failed: {}", e),
            }
        }

        let outages = monitors.iter().cloned().zip(per_monitor).collect();
        Ok(DashboardData {
            monitors,
            outages,
            fetched_at: Some(fetched_at),
        })
    }
}

/// Raw inputs of one chart widget.
#[derive(Debug, Clone)]
pub struct ChartData {
    pub samples: Vec<Sample>,
    /// `None` when the outage feed could not be fetched.
    pub outages: Option<Vec<Outage>>,
    pub fetched_at: DateTime<Utc>,
}

pub struct ChartFetch {
    pub api: Arc<dyn MonitorApi>,
    pub id: MonitorId,
    pub range: TimeWindow,
    pub outage_limit: usize,
}

#[async_trait]
impl FetchSource<ChartData> for ChartFetch {
    async fn fetch(&self) -> Result<ChartData, ApiError> {
        let (samples, outages) = tokio::join!(
            self.api.list_samples(&self.id, self.range),
            self.api.list_outages(&self.id, self.outage_limit)
        );

        let outages = match outages {
            Ok(outages) => Some(outages),
            Err(e) => {
                tracing::debug!("Chart {} {}: no outage feed, using gaps: {}", self.id, self.range, e);
                None
            }
        };

        Ok(ChartData {
            samples: samples?,
            outages,
            fetched_at: Utc::now(),
        })
    }
}

pub struct HeartbeatFetch {
    pub api: Arc<dyn MonitorApi>,
    pub id: MonitorId,
    pub limit: usize,
}

#[async_trait]
impl FetchSource<Vec<Heartbeat>> for HeartbeatFetch {
    async fn fetch(&self) -> Result<Vec<Heartbeat>, ApiError> {
        self.api.list_heartbeats(&self.id, self.limit).await
    }
}
