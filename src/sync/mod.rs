//! View synchronization: polling sessions, the edit-session guard and the
//! bookkeeping for optimistic records.

mod guard;
mod pending;
mod poller;
mod registry;
mod status;

pub use guard::*;
pub use pending::*;
pub use poller::*;
pub use registry::*;
pub use status::*;

use thiserror::Error;

use crate::api::MonitorId;

/// Sync error types.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("another form is already open: {0:?}")]
    EditInProgress(EditSession),
    #[error("monitor {0} not found")]
    NotFound(MonitorId),
}
