//! Process-wide edit-session guard.
//!
//! Lifecycle: `begin_create`/`begin_edit` when a form opens, `finish` once
//! the write call has settled (success or failure) or the form is abandoned.
//! While a session is open every gated poller skips its fetches.

use serde::Serialize;
use tokio::sync::watch;

use crate::api::MonitorId;

use super::SyncError;

/// What the single open form is doing, if anything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditSession {
    #[default]
    Idle,
    Creating,
    Editing { monitor_id: MonitorId },
}

impl EditSession {
    pub fn is_active(&self) -> bool {
        !matches!(self, EditSession::Idle)
    }
}

/// Shared cell holding the current [`EditSession`]. Cloning shares the cell.
#[derive(Debug, Clone)]
pub struct EditSessionGuard {
    tx: watch::Sender<EditSession>,
}

impl Default for EditSessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSessionGuard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(EditSession::Idle);
        Self { tx }
    }

    /// Polling is suspended while a create or edit is open.
    pub fn is_suspended(&self) -> bool {
        self.tx.borrow().is_active()
    }

    pub fn current(&self) -> EditSession {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EditSession> {
        self.tx.subscribe()
    }

    pub fn begin_create(&self) -> Result<(), SyncError> {
        self.begin(EditSession::Creating)
    }

    pub fn begin_edit(&self, monitor_id: MonitorId) -> Result<(), SyncError> {
        self.begin(EditSession::Editing { monitor_id })
    }

    /// Make sure a create session is open, reusing one the caller already holds.
    pub fn ensure_create(&self) -> Result<(), SyncError> {
        if *self.tx.borrow() == EditSession::Creating {
            return Ok(());
        }
        self.begin_create()
    }

    /// Make sure an edit session for `monitor_id` is open.
    pub fn ensure_edit(&self, monitor_id: &MonitorId) -> Result<(), SyncError> {
        if matches!(&*self.tx.borrow(), EditSession::Editing { monitor_id: id } if id == monitor_id)
        {
            return Ok(());
        }
        self.begin_edit(monitor_id.clone())
    }

    /// Lift the guard. Only call once the write has settled.
    pub fn finish(&self) {
        let lifted = self.tx.send_if_modified(|session| {
            if session.is_active() {
                *session = EditSession::Idle;
                true
            } else {
                false
            }
        });
        if lifted {
            tracing::debug!("Edit session finished, polling resumes");
        }
    }

    fn begin(&self, next: EditSession) -> Result<(), SyncError> {
        let mut busy = None;
        self.tx.send_if_modified(|session| {
            if session.is_active() {
                busy = Some(session.clone());
                false
            } else {
                *session = next.clone();
                true
            }
        });

        match busy {
            Some(current) => Err(SyncError::EditInProgress(current)),
            None => {
                tracing::debug!("Edit session started: {:?}, polling suspended", next);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_by_default() {
        let guard = EditSessionGuard::new();
        assert!(!guard.is_suspended());
        assert_eq!(guard.current(), EditSession::Idle);
    }

    #[test]
    fn test_create_suspends_until_finish() {
        let guard = EditSessionGuard::new();
        guard.begin_create().unwrap();
        assert!(guard.is_suspended());

        guard.finish();
        assert!(!guard.is_suspended());
    }

    #[test]
    fn test_only_one_form_at_a_time() {
        let guard = EditSessionGuard::new();
        guard.begin_edit(MonitorId::new("1")).unwrap();

        let err = guard.begin_create().unwrap_err();
        assert!(matches!(err, SyncError::EditInProgress(EditSession::Editing { .. })));
        assert_eq!(
            guard.current(),
            EditSession::Editing {
                monitor_id: MonitorId::new("1")
            }
        );
    }

    #[test]
    fn test_clones_share_state() {
        let guard = EditSessionGuard::new();
        let other = guard.clone();
        guard.begin_create().unwrap();
        assert!(other.is_suspended());
        other.finish();
        assert!(!guard.is_suspended());
    }

    #[test]
    fn test_ensure_reuses_matching_session() {
        let guard = EditSessionGuard::new();
        guard.ensure_create().unwrap();
        guard.ensure_create().unwrap();
        assert!(guard.ensure_edit(&MonitorId::new("3")).is_err());

        guard.finish();
        guard.ensure_edit(&MonitorId::new("3")).unwrap();
        guard.ensure_edit(&MonitorId::new("3")).unwrap();
        assert!(guard.ensure_edit(&MonitorId::new("4")).is_err());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let guard = EditSessionGuard::new();
        let mut rx = guard.subscribe();

        guard.begin_create().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), EditSession::Creating);

        guard.finish();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), EditSession::Idle);
    }
}
