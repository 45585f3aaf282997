//! Job status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a tracked job.
///
/// State transitions:
/// - Queued -> Working -> Complete
/// - Queued -> Working -> Retrying -> Working (loop, backoff owned by the scheduler)
/// - Working -> Stopped (cooperative stop observed by the progress API)
/// - Working -> Failed | Interrupted
///
/// Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Working,
    Retrying,
    Complete,
    Stopped,
    Failed,
    Interrupted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Queued,
        JobStatus::Working,
        JobStatus::Retrying,
        JobStatus::Complete,
        JobStatus::Stopped,
        JobStatus::Failed,
        JobStatus::Interrupted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Working => "working",
            JobStatus::Retrying => "retrying",
            JobStatus::Complete => "complete",
            JobStatus::Stopped => "stopped",
            JobStatus::Failed => "failed",
            JobStatus::Interrupted => "interrupted",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Stopped | JobStatus::Failed | JobStatus::Interrupted
        )
    }

    /// Is the job executing (or between attempts)?
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Working | JobStatus::Retrying)
    }

    /// Whether the hooks may move a record from `self` to `next`.
    ///
    /// Not enforced against external writers; the hooks use it to keep
    /// terminal states absorbing.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (Queued, Working) => true,
            (Working, Retrying) => true,
            (Retrying, Working) => true,
            (Working, to) if to.is_terminal() => true,
            // a job can be killed or fail before its first pre-execution write lands
            (Queued | Retrying, Failed | Interrupted | Stopped) => true,
            // re-entrant writes (progress while working, re-submission of a queued job)
            (from, to) => from == to,
        }
    }

    /// Display severity used by observers.
    pub fn label(self) -> StatusLabel {
        match self {
            JobStatus::Complete => StatusLabel::Success,
            JobStatus::Working | JobStatus::Retrying => StatusLabel::Warning,
            JobStatus::Queued => StatusLabel::Primary,
            _ => StatusLabel::Danger,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Severity classification of a status for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Success,
    Warning,
    Primary,
    Danger,
}

impl StatusLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLabel::Success => "success",
            StatusLabel::Warning => "warning",
            StatusLabel::Primary => "primary",
            StatusLabel::Danger => "danger",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
