//! Optimistic records awaiting confirmation from the server.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::api::{MonitorId, MonitorSnapshot};

#[derive(Debug, Clone)]
struct PendingRecord {
    record: MonitorSnapshot,
    /// Set once the server has assigned the record its identity.
    confirmed_at: Option<DateTime<Utc>>,
}

/// Records created locally that the last fetched list may not reflect yet.
///
/// A temporary record lives only while its create call is open. A confirmed
/// record lives until a list fetched after its confirmation either contains
/// it or proves it gone.
#[derive(Debug, Default)]
pub struct PendingRecords {
    records: Mutex<Vec<PendingRecord>>,
}

impl PendingRecords {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or overwrite an unconfirmed record, keyed by id.
    pub fn insert(&self, record: MonitorSnapshot) {
        let mut records = self.lock();
        let entry = PendingRecord {
            record,
            confirmed_at: None,
        };
        match records.iter_mut().find(|r| r.record.id == entry.record.id) {
            Some(existing) => *existing = entry,
            None => records.push(entry),
        }
    }

    /// Swap the record with id `from` for its persisted version, confirmed
    /// by the server at `at`.
    pub fn confirm(&self, from: &MonitorId, record: MonitorSnapshot, at: DateTime<Utc>) {
        let mut records = self.lock();
        records.retain(|r| r.record.id != *from && r.record.id != record.id);
        records.push(PendingRecord {
            record,
            confirmed_at: Some(at),
        });
    }

    pub fn remove(&self, id: &MonitorId) -> Option<MonitorSnapshot> {
        let mut records = self.lock();
        let pos = records.iter().position(|r| r.record.id == *id)?;
        Some(records.remove(pos).record)
    }

    /// Merge the pending records into the list fetched at `fetched_at`.
    ///
    /// A pending record is matched to a server record by id first and,
    /// failing that, by name and url; matched records are forgotten. Of the
    /// unmatched ones, a confirmed record survives only while the list
    /// predates its confirmation, and a temporary one only while `suspended`.
    /// Survivors keep their place at the end of the list.
    pub fn reconcile(
        &self,
        server: &[MonitorSnapshot],
        fetched_at: Option<DateTime<Utc>>,
        suspended: bool,
    ) -> Vec<MonitorSnapshot> {
        let mut records = self.lock();
        records.retain(|pending| {
            if server.iter().any(|m| matches_record(m, &pending.record)) {
                return false;
            }
            match pending.confirmed_at {
                Some(at) if fetched_at.is_some_and(|fetched| fetched >= at) => {
                    tracing::debug!(
                        "Monitor {} missing from a fresh list, dropping local copy",
                        pending.record.id
                    );
                    false
                }
                Some(_) => true,
                None => suspended,
            }
        });

        let mut merged = server.to_vec();
        merged.extend(records.iter().map(|r| r.record.clone()));
        merged
    }
}

fn matches_record(server: &MonitorSnapshot, pending: &MonitorSnapshot) -> bool {
    if server.id == pending.id {
        return true;
    }
    // Fallback for records whose id changed on the way to the server.
    !pending.name.is_empty() && server.name == pending.name && server.url == pending.url
}
