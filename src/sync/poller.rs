//! Polling and retry controller.
//!
//! A [`PollingSession`] repeatedly runs a [`FetchSource`] on an interval and
//! publishes the last good result plus connection status through a `watch`
//! channel. Failed attempts are retried after `retry_delay` until the retry
//! budget is spent; the regular interval keeps firing regardless.
//!
//! Every continuation (fetch resolution, retry timer) holds the cancellation
//! token of the run that issued it and checks it before touching shared state,
//! so nothing is published after `stop()` or teardown.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::ApiError;

use super::{EditSessionGuard, SyncStatus};

/// Callback invoked on every failed attempt, retries included.
pub type ErrorCallback = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Something the controller can poll.
#[async_trait]
pub trait FetchSource<T>: Send + Sync {
    async fn fetch(&self) -> Result<T, ApiError>;
}

/// Adapts an async closure into a [`FetchSource`].
pub struct FnFetch<F>(pub F);

#[async_trait]
impl<T, F, Fut> FetchSource<T> for FnFetch<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ApiError>> + Send,
{
    async fn fetch(&self) -> Result<T, ApiError> {
        (self.0)().await
    }
}

/// Controller configuration.
#[derive(Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub enabled: bool,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub on_error: Option<ErrorCallback>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            enabled: true,
            retry_count: 3,
            retry_delay: Duration::from_secs(5),
            on_error: None,
        }
    }
}

impl fmt::Debug for PollerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollerConfig")
            .field("interval", &self.interval)
            .field("enabled", &self.enabled)
            .field("retry_count", &self.retry_count)
            .field("retry_delay", &self.retry_delay)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Published output of a session.
#[derive(Debug)]
pub struct PollState<T> {
    pub data: Option<Arc<T>>,
    pub loading: bool,
    pub status: SyncStatus,
}

impl<T> Clone for PollState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            loading: self.loading,
            status: self.status.clone(),
        }
    }
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            status: SyncStatus::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    /// First fetch after `start()` and manual refreshes; toggles `loading`.
    Foreground,
    /// Scheduled tick; leaves `loading` alone.
    Background,
    Retry,
}

struct Control {
    config: PollerConfig,
    gate: Option<EditSessionGuard>,
    /// Token of the current start/stop cycle, a child of the session token.
    run: CancellationToken,
    ticker: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
    foreground: usize,
    retries_scheduled: u32,
}

struct Inner<T> {
    name: String,
    source: Arc<dyn FetchSource<T>>,
    state: watch::Sender<PollState<T>>,
    control: Mutex<Control>,
    alive: CancellationToken,
}

impl<T> Inner<T> {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One polling session. Owns its interval timer and at most one pending
/// retry timer; both are released on `stop()` and on drop.
pub struct PollingSession<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + Sync + 'static> PollingSession<T> {
    /// Create a stopped session.
    pub fn new(name: &str, source: Arc<dyn FetchSource<T>>, config: PollerConfig) -> Self {
        let (state, _) = watch::channel(PollState::default());
        let alive = CancellationToken::new();
        let control = Control {
            config,
            gate: None,
            run: alive.child_token(),
            ticker: None,
            retry: None,
            foreground: 0,
            retries_scheduled: 0,
        };

        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                source,
                state,
                control: Mutex::new(control),
                alive,
            }),
        }
    }

    /// Skip fetches while the given guard is suspended.
    pub fn with_gate(self, guard: EditSessionGuard) -> Self {
        self.inner.control().gate = Some(guard);
        self
    }

    /// Start the session if its configuration says it is enabled.
    pub fn launch(self) -> Self {
        let enabled = self.inner.control().config.enabled;
        if enabled {
            self.start();
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Fetch immediately, then on every interval. No-op if already running.
    pub fn start(&self) {
        if self.inner.alive.is_cancelled() {
            return;
        }

        let mut ctl = self.inner.control();
        if ctl.ticker.is_some() {
            return;
        }

        let mut interval = ctl.config.interval;
        if interval.is_zero() {
            tracing::warn!("Poller '{}': zero interval, using 1s", self.inner.name);
            interval = Duration::from_secs(1);
        }

        ctl.config.enabled = true;
        ctl.run = self.inner.alive.child_token();
        let token = ctl.run.clone();

        tracing::debug!(
            "Poller '{}': starting with interval {:?}",
            self.inner.name,
            interval
        );

        issue_fetch(&self.inner, &mut ctl, FetchMode::Foreground);
        ctl.ticker = Some(spawn_ticker(self.inner.clone(), token, interval));
    }

    /// Cancel the interval timer, any pending retry and any fetch still in
    /// flight. Idempotent.
    pub fn stop(&self) {
        let mut ctl = self.inner.control();
        ctl.run.cancel();
        ctl.run = self.inner.alive.child_token();
        ctl.config.enabled = false;
        ctl.retries_scheduled = 0;

        if let Some(handle) = ctl.ticker.take() {
            handle.abort();
            tracing::debug!("Poller '{}': stopped", self.inner.name);
        }
        if let Some(handle) = ctl.retry.take() {
            handle.abort();
        }

        if ctl.foreground > 0 {
            ctl.foreground = 0;
            self.inner.state.send_modify(|s| s.loading = false);
        }
    }

    /// Fetch now, outside the schedule. The interval phase is untouched.
    pub fn force_refresh(&self) {
        if self.inner.alive.is_cancelled() {
            return;
        }
        let mut ctl = self.inner.control();
        issue_fetch(&self.inner, &mut ctl, FetchMode::Foreground);
    }

    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Change the interval. A running session keeps its current timer; the
    /// new value applies on the next `start()`.
    pub fn set_interval(&self, interval: Duration) {
        let mut ctl = self.inner.control();
        ctl.config.interval = interval;
        if ctl.ticker.is_some() {
            tracing::info!(
                "Poller '{}': interval set to {:?}, applies after restart",
                self.inner.name,
                interval
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.control().ticker.is_some()
    }

    /// Tear the session down. Nothing is published afterwards.
    pub fn shutdown(&self) {
        if self.inner.alive.is_cancelled() {
            return;
        }
        self.inner.alive.cancel();

        let mut ctl = self.inner.control();
        if let Some(handle) = ctl.ticker.take() {
            handle.abort();
        }
        if let Some(handle) = ctl.retry.take() {
            handle.abort();
        }
        tracing::debug!("Poller '{}': torn down", self.inner.name);
    }

    pub fn state(&self) -> PollState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.inner.state.borrow().data.clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.state.borrow().status.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.inner.state.subscribe()
    }

    /// Wait until the session has either data or a recorded failure.
    pub async fn settled(&self) -> PollState<T> {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|s| s.data.is_some() || s.status.error_count > 0)
            .await
            .map(|s| s.clone());
        settled.unwrap_or_else(|_| self.state())
    }
}

impl<T> Drop for PollingSession<T> {
    fn drop(&mut self) {
        self.inner.alive.cancel();
        let mut ctl = self.inner.control();
        if let Some(handle) = ctl.ticker.take() {
            handle.abort();
        }
        if let Some(handle) = ctl.retry.take() {
            handle.abort();
        }
    }
}

fn spawn_ticker<T: Send + Sync + 'static>(
    inner: Arc<Inner<T>>,
    token: CancellationToken,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let mut ctl = inner.control();
                    if token.is_cancelled() {
                        break;
                    }
                    issue_fetch(&inner, &mut ctl, FetchMode::Background);
                }
            }
        }
    })
}

fn is_gated(ctl: &Control) -> bool {
    ctl.gate.as_ref().is_some_and(|g| g.is_suspended())
}

/// Spawn one fetch bound to the current run token.
fn issue_fetch<T: Send + Sync + 'static>(
    inner: &Arc<Inner<T>>,
    ctl: &mut Control,
    mode: FetchMode,
) {
    if is_gated(ctl) {
        tracing::debug!("Poller '{}': edit session open, skipping fetch", inner.name);
        return;
    }

    if mode == FetchMode::Foreground {
        ctl.foreground += 1;
        inner.state.send_if_modified(|s| !std::mem::replace(&mut s.loading, true));
    }

    tokio::spawn(run_fetch(inner.clone(), ctl.run.clone(), mode));
}

fn run_fetch<T: Send + Sync + 'static>(
    inner: Arc<Inner<T>>,
    token: CancellationToken,
    mode: FetchMode,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let source = inner.source.clone();
        // The fetch runs in its own task so a panic becomes a failed attempt.
        let fetch = tokio::spawn(async move { source.fetch().await });

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            joined = fetch => match joined {
                Ok(result) => result,
                Err(e) => Err(ApiError::Task(e.to_string())),
            },
        };

        apply_outcome(&inner, &token, mode, outcome);
    })
}

fn apply_outcome<T: Send + Sync + 'static>(
    inner: &Arc<Inner<T>>,
    token: &CancellationToken,
    mode: FetchMode,
    outcome: Result<T, ApiError>,
) {
    let mut ctl = inner.control();
    if token.is_cancelled() {
        return;
    }

    if mode == FetchMode::Foreground {
        ctl.foreground = ctl.foreground.saturating_sub(1);
    }
    let loading = ctl.foreground > 0;
    let retry_count = ctl.config.retry_count;

    match outcome {
        Ok(data) if !is_gated(&ctl) => {
            ctl.retries_scheduled = 0;
            inner.state.send_modify(|s| {
                s.data = Some(Arc::new(data));
                s.loading = loading;
                s.status.record_success(Utc::now());
            });
            tracing::debug!("Poller '{}': {:?} fetch ok", inner.name, mode);
        }
        Ok(_) => {
            tracing::debug!(
                "Poller '{}': result arrived during edit session, discarded",
                inner.name
            );
            inner.state.send_if_modified(|s| std::mem::replace(&mut s.loading, loading) != loading);
        }
        Err(err) => {
            inner.state.send_modify(|s| {
                s.loading = loading;
                s.status.record_failure(retry_count);
            });
            let errors = inner.state.borrow().status.error_count;
            tracing::warn!(
                "Poller '{}': {:?} fetch failed ({} consecutive): {}",
                inner.name,
                mode,
                errors,
                err
            );

            let retry_pending = ctl.retry.as_ref().is_some_and(|h| !h.is_finished());
            if ctl.retries_scheduled < retry_count && (mode == FetchMode::Retry || !retry_pending) {
                schedule_retry(inner, &mut ctl);
            }

            let on_error = ctl.config.on_error.clone();
            drop(ctl);
            if let Some(callback) = on_error {
                callback(&err);
            }
        }
    }
}

fn schedule_retry<T: Send + Sync + 'static>(inner: &Arc<Inner<T>>, ctl: &mut Control) {
    ctl.retries_scheduled += 1;
    let attempt = ctl.retries_scheduled;
    let delay = ctl.config.retry_delay;
    let token = ctl.run.clone();
    let task_inner = inner.clone();

    tracing::debug!(
        "Poller '{}': retry {} scheduled in {:?}",
        inner.name,
        attempt,
        delay
    );

    ctl.retry = Some(tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        {
            let ctl = task_inner.control();
            if token.is_cancelled() {
                return;
            }
            if is_gated(&ctl) {
                tracing::debug!(
                    "Poller '{}': edit session open, dropping retry",
                    task_inner.name
                );
                return;
            }
        }

        run_fetch(task_inner, token, FetchMode::Retry).await;
    }));
}
