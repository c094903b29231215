//! Top-level view state: the endpoint list session, per-widget sessions and
//! the write path.
//!
//! Writes go through the edit-session guard. A create shows a temporary
//! record before the network call, and the guard is lifted only once the call
//! has settled, so a background refresh never races ahead of a write.

mod refresh;
#[cfg(test)]
pub(crate) mod testing;

pub use refresh::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::{
    ApiError, Heartbeat, MonitorApi, MonitorId, MonitorInput, MonitorSnapshot, PauseState,
    TimeWindow,
};
use crate::config::ServerConfig;
use crate::metrics::{
    build_chart, compute_rollup, heartbeat_strip, merge_outages, ChartInput, ChartView,
    DashboardRollup, HeartbeatStrip, MonitorOutage, DASHBOARD_OUTAGE_CAP,
};
use crate::settings::SettingsHandle;
use crate::sync::{
    EditSession, EditSessionGuard, PendingRecords, PollState, PollingSession, SessionRegistry,
    SyncError, SyncStatus,
};

/// Write path error types.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("invalid monitor: {0}")]
    Invalid(String),
    #[error("{}", .0.user_message())]
    Api(#[from] ApiError),
}

/// Everything the dashboard page renders.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub monitors: Vec<MonitorSnapshot>,
    pub rollup: DashboardRollup,
    pub outages: Vec<MonitorOutage>,
    pub status: SyncStatus,
    pub loading: bool,
    /// True while a form is open and the list is not being refreshed.
    pub suspended: bool,
    pub edit_session: EditSession,
}

/// Current output of a widget session. `view` stays empty until the first
/// fetch succeeds; failures only show up in `status`.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetView<V> {
    pub view: Option<V>,
    pub status: SyncStatus,
    pub loading: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WidgetStatus {
    pub monitor_id: MonitorId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<TimeWindow>,
    pub status: SyncStatus,
}

/// Connection status of every live session.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub dashboard: SyncStatus,
    pub charts: Vec<WidgetStatus>,
    pub heartbeats: Vec<WidgetStatus>,
}

type ChartKey = (MonitorId, TimeWindow);

pub struct Dashboard {
    api: Arc<dyn MonitorApi>,
    config: ServerConfig,
    settings: SettingsHandle,
    guard: EditSessionGuard,
    pending: PendingRecords,
    session: PollingSession<DashboardData>,
    charts: Arc<SessionRegistry<ChartKey, ChartData>>,
    heartbeats: Arc<SessionRegistry<MonitorId, Vec<Heartbeat>>>,
    write_in_flight: AtomicBool,
}

impl Dashboard {
    /// Build the dashboard and start polling the endpoint list.
    pub fn new(api: Arc<dyn MonitorApi>, config: ServerConfig, settings: SettingsHandle) -> Self {
        let guard = EditSessionGuard::new();
        let source = Arc::new(DashboardFetch {
            api: api.clone(),
            outage_limit: config.outage_limit,
        });
        let session = PollingSession::new(
            "dashboard",
            source,
            config.poller_config(config.dashboard_interval),
        )
        .with_gate(guard.clone())
        .launch();

        Self {
            charts: Arc::new(SessionRegistry::new("charts", config.session_idle_timeout)),
            heartbeats: Arc::new(SessionRegistry::new(
                "heartbeats",
                config.session_idle_timeout,
            )),
            api,
            config,
            settings,
            guard,
            pending: PendingRecords::new(),
            session,
            write_in_flight: AtomicBool::new(false),
        }
    }

    /// Start the idle-session reapers. They stop, and close every widget
    /// session, when `cancel` fires.
    pub fn start_background(&self, cancel: CancellationToken) {
        self.charts.start_reaper(cancel.clone());
        self.heartbeats.start_reaper(cancel);
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
        self.charts.clear();
        self.heartbeats.clear();
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn edit_session(&self) -> EditSession {
        self.guard.current()
    }

    /// Foreground refresh of the endpoint list. Skipped while a form is open.
    pub fn refresh(&self) {
        self.session.force_refresh();
    }

    pub fn view(&self) -> DashboardView {
        let state = self.session.state();
        let data = state.data.clone().unwrap_or_default();
        let edit_session = self.guard.current();
        let suspended = edit_session.is_active();
        let monitors = self
            .pending
            .reconcile(&data.monitors, data.fetched_at, suspended);

        DashboardView {
            rollup: compute_rollup(&monitors),
            outages: merge_outages(&data.outages, DASHBOARD_OUTAGE_CAP),
            monitors,
            status: state.status,
            loading: state.loading,
            suspended,
            edit_session,
        }
    }

    pub fn status_report(&self) -> StatusReport {
        let charts = self
            .charts
            .statuses()
            .into_iter()
            .map(|((monitor_id, range), status)| WidgetStatus {
                monitor_id,
                range: Some(range),
                status,
            })
            .collect();
        let heartbeats = self
            .heartbeats
            .statuses()
            .into_iter()
            .map(|(monitor_id, status)| WidgetStatus {
                monitor_id,
                range: None,
                status,
            })
            .collect();

        StatusReport {
            dashboard: self.session.status(),
            charts,
            heartbeats,
        }
    }

    fn find_monitor(&self, id: &MonitorId) -> Option<MonitorSnapshot> {
        let data = self.session.data()?;
        data.monitors.iter().find(|m| m.id == *id).cloned()
    }

    // ---------------------------------------------------------------------
    // Forms
    // ---------------------------------------------------------------------

    pub fn open_create_form(&self) -> Result<(), SyncError> {
        self.guard.begin_create()
    }

    pub fn open_edit_form(&self, id: &MonitorId) -> Result<MonitorSnapshot, SyncError> {
        let monitor = self
            .find_monitor(id)
            .ok_or_else(|| SyncError::NotFound(id.clone()))?;
        self.guard.begin_edit(id.clone())?;
        Ok(monitor)
    }

    /// Abandon the open form. Ignored while its write is still in flight.
    pub fn cancel_form(&self) -> bool {
        if self.write_in_flight.load(Ordering::SeqCst) {
            tracing::debug!("Write in flight, form stays open until it settles");
            return false;
        }
        self.guard.finish();
        true
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    pub async fn create_monitor(&self, input: MonitorInput) -> Result<MonitorSnapshot, WriteError> {
        let input = validate_input(input)?;
        let mut scope = self.begin_write(|guard| guard.ensure_create())?;

        let draft = MonitorSnapshot::temporary(&input);
        self.pending.insert(draft.clone());
        scope.draft = Some(draft.id.clone());

        let created = match self.api.create_monitor(&input).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!("Failed to create monitor '{}': {}", input.name, e);
                return Err(e.into());
            }
        };

        self.pending.confirm(&draft.id, created.clone(), Utc::now());
        scope.commit();
        drop(scope);

        tracing::info!("Created monitor {} ({})", created.id, created.name);
        self.session.force_refresh();
        Ok(created)
    }

    pub async fn update_monitor(
        &self,
        id: &MonitorId,
        input: MonitorInput,
    ) -> Result<MonitorSnapshot, WriteError> {
        let input = validate_input(input)?;
        if id.is_temporary() {
            return Err(SyncError::NotFound(id.clone()).into());
        }
        let scope = self.begin_write(|guard| guard.ensure_edit(id))?;

        let result = self.api.update_monitor(id, &input).await;
        drop(scope);

        match result {
            Ok(updated) => {
                tracing::info!("Updated monitor {}", id);
                self.session.force_refresh();
                Ok(updated)
            }
            Err(e) => {
                tracing::error!("Failed to update monitor {}: {}", id, e);
                Err(e.into())
            }
        }
    }

    pub async fn delete_monitor(&self, id: &MonitorId) -> Result<(), WriteError> {
        if id.is_temporary() {
            return match self.pending.remove(id) {
                Some(_) => Ok(()),
                None => Err(SyncError::NotFound(id.clone()).into()),
            };
        }

        if let Err(e) = self.api.delete_monitor(id).await {
            tracing::error!("Failed to delete monitor {}: {}", id, e);
            return Err(e.into());
        }

        self.pending.remove(id);
        let closed = self.charts.remove_where(|(monitor_id, _)| monitor_id == id)
            + self.heartbeats.remove_where(|monitor_id| monitor_id == id);
        tracing::info!("Deleted monitor {} ({} widget sessions closed)", id, closed);
        self.session.force_refresh();
        Ok(())
    }

    pub async fn toggle_pause(&self, id: &MonitorId) -> Result<PauseState, WriteError> {
        if id.is_temporary() {
            return Err(SyncError::NotFound(id.clone()).into());
        }

        match self.api.toggle_pause(id).await {
            Ok(state) => {
                tracing::info!("Monitor {} paused: {}", id, state.paused);
                self.session.force_refresh();
                Ok(state)
            }
            Err(e) => {
                tracing::error!("Failed to toggle pause on {}: {}", id, e);
                Err(e.into())
            }
        }
    }

    /// Claim the single write slot, then open (or reuse) the edit session.
    /// A second write while one is in flight is refused, so the guard is only
    /// lifted by the write that actually settles last.
    fn begin_write<F>(&self, open: F) -> Result<WriteScope<'_>, SyncError>
    where
        F: FnOnce(&EditSessionGuard) -> Result<(), SyncError>,
    {
        if self
            .write_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Write refused, another one is in flight");
            return Err(SyncError::EditInProgress(self.guard.current()));
        }
        if let Err(e) = open(&self.guard) {
            self.write_in_flight.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(WriteScope {
            dashboard: self,
            draft: None,
        })
    }

    // ---------------------------------------------------------------------
    // Widgets
    // ---------------------------------------------------------------------

    /// Response-time chart for one monitor, rendered in the current display
    /// offset.
    pub async fn chart(&self, id: &MonitorId, range: TimeWindow) -> WidgetView<ChartView> {
        let (session, _) = self.charts.get_or_create((id.clone(), range), || {
            let source = Arc::new(ChartFetch {
                api: self.api.clone(),
                id: id.clone(),
                range,
                outage_limit: self.config.outage_limit,
            });
            PollingSession::new(
                &format!("chart {} {}", id, range),
                source,
                self.config.poller_config(self.config.chart_interval),
            )
            .launch()
        });

        let state = self.first_result(&session).await;
        let check_interval = self.find_monitor(id).and_then(|m| m.check_interval);
        let offset = self.settings.get().offset();

        let view = state.data.as_deref().map(|data| {
            build_chart(ChartInput {
                range,
                samples: &data.samples,
                outages: data.outages.as_deref(),
                check_interval,
                now: Utc::now().max(data.fetched_at),
                offset,
            })
        });

        WidgetView {
            view,
            status: state.status,
            loading: state.loading,
        }
    }

    pub async fn heartbeats(&self, id: &MonitorId) -> WidgetView<HeartbeatStrip> {
        let (session, _) = self.heartbeats.get_or_create(id.clone(), || {
            let source = Arc::new(HeartbeatFetch {
                api: self.api.clone(),
                id: id.clone(),
                limit: self.config.heartbeat_limit,
            });
            PollingSession::new(
                &format!("heartbeats {}", id),
                source,
                self.config.poller_config(self.config.heartbeat_interval),
            )
            .launch()
        });

        let state = self.first_result(&session).await;
        WidgetView {
            view: state.data.as_deref().map(|beats| heartbeat_strip(beats)),
            status: state.status,
            loading: state.loading,
        }
    }

    /// Current state of a widget session, waiting up to the request timeout
    /// for a fresh session to produce something.
    async fn first_result<T: Send + Sync + 'static>(
        &self,
        session: &PollingSession<T>,
    ) -> PollState<T> {
        let state = session.state();
        if state.data.is_some() || state.status.error_count > 0 {
            return state;
        }
        let wait = self.config.request_timeout + Duration::from_secs(1);
        match tokio::time::timeout(wait, session.settled()).await {
            Ok(state) => state,
            Err(_) => session.state(),
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Holds the edit session open for the duration of one write, and lifts it
/// when dropped, including when the write future is cancelled.
struct WriteScope<'a> {
    dashboard: &'a Dashboard,
    draft: Option<MonitorId>,
}

impl WriteScope<'_> {
    /// The draft was exchanged for a persisted record; keep it.
    fn commit(&mut self) {
        self.draft = None;
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.draft.take() {
            self.dashboard.pending.remove(&id);
            tracing::debug!("Rolled back temporary record {}", id);
        }
        self.dashboard.write_in_flight.store(false, Ordering::SeqCst);
        self.dashboard.guard.finish();
    }
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^\s/?#]+[^\s]*$").unwrap())
}

/// Trim and check a create/update body.
pub fn validate_input(mut input: MonitorInput) -> Result<MonitorInput, WriteError> {
    input.name = input.name.trim().to_string();
    input.url = input.url.trim().to_string();

    if input.name.is_empty() {
        return Err(WriteError::Invalid("name is required".to_string()));
    }
    if !url_pattern().is_match(&input.url) {
        return Err(WriteError::Invalid(format!(
            "url must be an http(s) address: {}",
            input.url
        )));
    }
    if input.check_interval == Some(0) {
        return Err(WriteError::Invalid(
            "check interval must be at least 1 second".to_string(),
        ));
    }
    Ok(input)
}
