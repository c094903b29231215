//! In-memory stand-in for the monitoring API.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::api::{
    ApiError, Heartbeat, MonitorApi, MonitorId, MonitorInput, MonitorSnapshot, MonitorStatus,
    Outage, PauseState, Sample, TimeWindow,
};

pub fn monitor(id: &str, status: MonitorStatus) -> MonitorSnapshot {
    MonitorSnapshot {
        id: MonitorId::new(id),
        name: format!("monitor-{}", id),
        url: format!("https://{}.example.com", id),
        status,
        paused: false,
        current_response: Some(100.0),
        uptime_24h: Some(99.0),
        check_interval: Some(60),
    }
}

/// Outage on 2024-01-01 between the given hours.
pub fn outage(start_hour: u32, end_hour: Option<u32>) -> Outage {
    let at = |hour: u32| Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap();
    Outage {
        started_at: at(start_hour),
        ended_at: end_hour.map(at),
        reason: Some(format!("down since {}h", start_hour)),
    }
}

#[derive(Default)]
struct FakeState {
    monitors: Vec<MonitorSnapshot>,
    outages: HashMap<MonitorId, Vec<Outage>>,
    broken_outages: HashSet<MonitorId>,
    offline: bool,
    rejection: Option<String>,
    write_delay: Duration,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
    list_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl FakeApi {
    pub fn with_monitors(monitors: Vec<MonitorSnapshot>) -> Arc<Self> {
        let api = Self::default();
        {
            let mut state = api.state.lock().unwrap();
            state.monitors = monitors;
            state.next_id = 100;
        }
        Arc::new(api)
    }

    pub fn set_outages(&self, id: &str, outages: Vec<Outage>) {
        self.state
            .lock()
            .unwrap()
            .outages
            .insert(MonitorId::new(id), outages);
    }

    pub fn fail_outages_for(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_outages
            .insert(MonitorId::new(id));
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Make every write fail with a 422 carrying `message`.
    pub fn reject_writes(&self, message: &str) {
        self.state.lock().unwrap().rejection = Some(message.to_string());
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().unwrap().write_delay = delay;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), ApiError> {
        if self.state.lock().unwrap().offline {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    async fn begin_write(&self) -> Result<(), ApiError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().unwrap().write_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;
        match self.state.lock().unwrap().rejection.clone() {
            Some(message) => Err(ApiError::Status {
                status: 422,
                message,
            }),
            None => Ok(()),
        }
    }
}

fn not_found() -> ApiError {
    ApiError::Status {
        status: 404,
        message: "monitor not found".to_string(),
    }
}

#[async_trait]
impl MonitorApi for FakeApi {
    async fn list_monitors(&self) -> Result<Vec<MonitorSnapshot>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.state.lock().unwrap().monitors.clone())
    }

    async fn list_outages(&self, id: &MonitorId, limit: usize) -> Result<Vec<Outage>, ApiError> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        if state.broken_outages.contains(id) {
            return Err(ApiError::Status {
                status: 500,
                message: "outage feed down".to_string(),
            });
        }
        let mut outages = state.outages.get(id).cloned().unwrap_or_default();
        outages.truncate(limit);
        Ok(outages)
    }

    async fn list_samples(
        &self,
        _id: &MonitorId,
        _range: TimeWindow,
    ) -> Result<Vec<Sample>, ApiError> {
        self.check_online()?;
        let now = Utc::now();
        Ok((0..12)
            .rev()
            .map(|i| Sample {
                created_at: now - chrono::Duration::minutes(i),
                response_time: Some(100.0 + i as f64),
                status: MonitorStatus::Up,
                min_response_time: None,
                max_response_time: None,
                data_points: Some(1),
            })
            .collect())
    }

    async fn list_heartbeats(
        &self,
        _id: &MonitorId,
        limit: usize,
    ) -> Result<Vec<Heartbeat>, ApiError> {
        self.check_online()?;
        let now = Utc::now();
        let mut beats: Vec<Heartbeat> = (0..4)
            .map(|i| Heartbeat {
                created_at: now - chrono::Duration::minutes(i),
                status: if i == 3 {
                    MonitorStatus::Down
                } else {
                    MonitorStatus::Up
                },
                response_time: Some(80.0),
                message: None,
            })
            .collect();
        beats.truncate(limit);
        Ok(beats)
    }

    async fn create_monitor(&self, input: &MonitorInput) -> Result<MonitorSnapshot, ApiError> {
        self.begin_write().await?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let created = MonitorSnapshot {
            id: MonitorId::new(state.next_id.to_string()),
            name: input.name.clone(),
            url: input.url.clone(),
            status: MonitorStatus::Pending,
            paused: false,
            current_response: None,
            uptime_24h: None,
            check_interval: input.check_interval,
        };
        state.monitors.push(created.clone());
        Ok(created)
    }

    async fn update_monitor(
        &self,
        id: &MonitorId,
        input: &MonitorInput,
    ) -> Result<MonitorSnapshot, ApiError> {
        self.begin_write().await?;
        let mut state = self.state.lock().unwrap();
        let existing = state
            .monitors
            .iter_mut()
            .find(|m| m.id == *id)
            .ok_or_else(not_found)?;
        existing.name = input.name.clone();
        existing.url = input.url.clone();
        existing.check_interval = input.check_interval;
        Ok(existing.clone())
    }

    async fn delete_monitor(&self, id: &MonitorId) -> Result<(), ApiError> {
        self.begin_write().await?;
        let mut state = self.state.lock().unwrap();
        let before = state.monitors.len();
        state.monitors.retain(|m| m.id != *id);
        if state.monitors.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    async fn toggle_pause(&self, id: &MonitorId) -> Result<PauseState, ApiError> {
        self.begin_write().await?;
        let mut state = self.state.lock().unwrap();
        let existing = state
            .monitors
            .iter_mut()
            .find(|m| m.id == *id)
            .ok_or_else(not_found)?;
        existing.paused = !existing.paused;
        Ok(PauseState {
            paused: existing.paused,
        })
    }
}
