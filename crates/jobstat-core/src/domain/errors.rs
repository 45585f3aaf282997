//! Errors - エラー型と分類
//!
//! - `StoreError`: the key-value adapter failed (connectivity, command, poisoned lock)
//! - `StatusError`: what the status core surfaces to its callers
//! - `JobError`: what a job body returns to the execution hooks

use thiserror::Error;

use super::ids::Jid;

/// Adapter-level failure talking to the key-value store.
///
/// Never retried by the core; the store client owns reconnection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("store state poisoned: {0}")]
    Poisoned(String),
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Absent or expired record (fewer than two populated fields).
    #[error("status for job {jid} not found")]
    NotFound { jid: Jid },

    /// Cooperative stop observed by the progress API.
    #[error("job {jid} stopped by request")]
    StoppedByRequest { jid: Jid },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StatusError {
    pub fn is_stop(&self) -> bool {
        matches!(self, StatusError::StoppedByRequest { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StatusError::NotFound { .. })
    }
}

/// Failure returned by a job body.
///
/// `Status(StoppedByRequest)` is the cancellation condition and maps to the
/// `stopped` terminal state, never to a generic failure.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Status(#[from] StatusError),

    /// The host runtime is killing the job (shutdown signal).
    #[error("job interrupted")]
    Interrupted,

    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, JobError::Status(e) if e.is_stop())
    }
}
