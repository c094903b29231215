//! Keyed polling sessions for per-widget views.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{PollingSession, SyncStatus};

struct Entry<T> {
    session: Arc<PollingSession<T>>,
    last_access: Instant,
}

/// Sessions created on first use and torn down once nobody has asked for
/// them in `idle_timeout`.
pub struct SessionRegistry<K, T> {
    name: &'static str,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<K, Entry<T>>>,
}

impl<K, T> SessionRegistry<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
    T: Send + Sync + 'static,
{
    pub fn new(name: &'static str, idle_timeout: Duration) -> Self {
        Self {
            name,
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<T>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the session for `key`, creating it with `make` if needed.
    /// The flag is true when the session was just created.
    pub fn get_or_create<F>(&self, key: K, make: F) -> (Arc<PollingSession<T>>, bool)
    where
        F: FnOnce() -> PollingSession<T>,
    {
        let mut sessions = self.lock();
        let now = Instant::now();

        if let Some(entry) = sessions.get_mut(&key) {
            entry.last_access = now;
            return (entry.session.clone(), false);
        }

        tracing::debug!("{}: opening session for {:?}", self.name, key);
        let session = Arc::new(make());
        sessions.insert(
            key,
            Entry {
                session: session.clone(),
                last_access: now,
            },
        );
        (session, true)
    }

    /// Tear down sessions idle for longer than the timeout.
    pub fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();

        sessions.retain(|key, entry| {
            let keep = now.duration_since(entry.last_access) <= self.idle_timeout;
            if !keep {
                tracing::debug!(
                    "{}: closing idle session '{}' for {:?}",
                    self.name,
                    entry.session.name(),
                    key
                );
                entry.session.shutdown();
            }
            keep
        });

        before - sessions.len()
    }

    /// Tear down every session whose key matches.
    pub fn remove_where<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|key, entry| {
            let remove = pred(key);
            if remove {
                entry.session.shutdown();
            }
            !remove
        });
        before - sessions.len()
    }

    /// Tear down everything.
    pub fn clear(&self) {
        for (_, entry) in self.lock().drain() {
            entry.session.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn statuses(&self) -> Vec<(K, SyncStatus)> {
        self.lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.session.status()))
            .collect()
    }

    /// Start the background task closing idle sessions.
    pub fn start_reaper(self: &Arc<Self>, cancel: CancellationToken) {
        let registry = Arc::clone(self);
        let period = (self.idle_timeout / 2).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if registry.is_empty() {
                            continue;
                        }
                        let closed = registry.reap_idle();
                        if closed > 0 {
                            tracing::info!(
                                "{}: closed {} idle sessions, {} still open",
                                registry.name,
                                closed,
                                registry.len()
                            );
                        }
                    }
                }
            }

            registry.clear();
        });
    }
}
