//! Connection status of a polling session.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connection and error bookkeeping for one polling session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_connected: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub retry_attempt: u32,
}

impl SyncStatus {
    /// Record a successful fetch. Counters reset and `last_update` never
    /// moves backwards.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.is_connected = true;
        self.error_count = 0;
        self.retry_attempt = 0;
        self.last_update = Some(match self.last_update {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }

    /// Record a failed fetch. `retry_attempt` saturates at `retry_count`.
    pub fn record_failure(&mut self, retry_count: u32) {
        self.is_connected = false;
        self.error_count = self.error_count.saturating_add(1);
        if self.retry_attempt < retry_count {
            self.retry_attempt += 1;
        }
    }
}
