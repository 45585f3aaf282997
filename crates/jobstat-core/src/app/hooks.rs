//! Lifecycle hooks - status transitions emitted as record writes.
//!
//! - `SubmissionHook`: client side, once per enqueue (`queued`)
//! - `ExecutionHooks`: worker side, once per execution attempt
//!   (`working` before, `complete`/`retrying`/`stopped`/`failed`/`interrupted` after)
//!
//! Terminal states are absorbing: once a record is terminal the hooks leave
//! `status` and `ended_at` alone. Out-of-order transitions are logged, not
//! rejected. Store failures propagate to the host unchanged.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app::storage::{StatusStorage, set};
use crate::domain::{Jid, JobError, JobStatus, StatusError, StatusRecord, fields};
use crate::ports::IdGenerator;

/// One enqueue as seen by the submission hook.
#[derive(Debug, Clone)]
pub struct Submission {
    /// `None` lets the hook assign one.
    pub jid: Option<Jid>,
    pub worker: String,
    pub args: Value,
    /// Per-worker TTL override.
    pub expiration_secs: Option<u64>,
}

impl Submission {
    pub fn new(worker: impl Into<String>, args: Value) -> Self {
        Self {
            jid: None,
            worker: worker.into(),
            args,
            expiration_secs: None,
        }
    }

    pub fn with_jid(mut self, jid: Jid) -> Self {
        self.jid = Some(jid);
        self
    }

    pub fn with_expiration(mut self, secs: u64) -> Self {
        self.expiration_secs = Some(secs);
        self
    }
}

pub struct SubmissionHook {
    storage: StatusStorage,
    ids: Arc<dyn IdGenerator>,
}

impl SubmissionHook {
    pub fn new(storage: StatusStorage, ids: Arc<dyn IdGenerator>) -> Self {
        Self { storage, ids }
    }

    /// Write the initial `queued` record and return the job's jid.
    pub async fn on_enqueue(&self, submission: Submission) -> Result<Jid, StatusError> {
        let jid = submission
            .jid
            .filter(|jid| !jid.is_empty())
            .unwrap_or_else(|| self.ids.generate_jid());
        let now = self.storage.clock().unix_now();

        let mut updates = vec![
            set(fields::JID, &jid),
            set(fields::WORKER, &submission.worker),
            set(fields::ARGS, &submission.args),
            set(fields::ENQUEUED_AT, now),
        ];

        let current = current_status(&self.storage, &jid).await?;
        match current {
            Some(status) if status.is_terminal() => {
                warn!(jid = %jid, %status, "re-submission of a finished job keeps its status");
            }
            _ => updates.push(set(fields::STATUS, JobStatus::Queued)),
        }

        self.storage
            .write(&jid, updates, submission.expiration_secs)
            .await?;
        info!(jid = %jid, worker = %submission.worker, "job queued");
        Ok(jid)
    }
}

/// How one execution attempt ended, from the hooks' point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Caught failure the host will retry.
    Retrying,
    /// The job observed a stop request.
    Stopped,
    Failed(String),
    /// The host runtime killed the job.
    Interrupted,
}

impl Outcome {
    /// Classify a job body's result. `retries_remaining` comes from the host
    /// scheduler, which owns the retry policy.
    pub fn from_result(result: &Result<(), JobError>, retries_remaining: bool) -> Self {
        match result {
            Ok(()) => Outcome::Complete,
            Err(e) if e.is_stop() => Outcome::Stopped,
            Err(JobError::Interrupted) => Outcome::Interrupted,
            Err(_) if retries_remaining => Outcome::Retrying,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Outcome::Complete => JobStatus::Complete,
            Outcome::Retrying => JobStatus::Retrying,
            Outcome::Stopped => JobStatus::Stopped,
            Outcome::Failed(_) => JobStatus::Failed,
            Outcome::Interrupted => JobStatus::Interrupted,
        }
    }
}

#[derive(Clone)]
pub struct ExecutionHooks {
    storage: StatusStorage,
}

impl ExecutionHooks {
    pub fn new(storage: StatusStorage) -> Self {
        Self { storage }
    }

    /// `working`, plus `started_at` on the first attempt only.
    pub async fn before_perform(
        &self,
        jid: &Jid,
        worker: &str,
        expiration_secs: Option<u64>,
    ) -> Result<(), StatusError> {
        let record = self.current(jid).await?;
        let current = record.as_ref().and_then(|r| r.status);

        if let Some(status) = current {
            if status.is_terminal() {
                warn!(jid = %jid, %status, "job already finished, not marking it working");
                return Ok(());
            }
            if !status.can_transition_to(JobStatus::Working) {
                warn!(jid = %jid, from = %status, to = %JobStatus::Working, "unexpected transition");
            }
        }

        let now = self.storage.clock().unix_now();
        let mut updates = vec![
            set(fields::JID, jid),
            set(fields::STATUS, JobStatus::Working),
            set(fields::WORKER, worker),
        ];
        if record.as_ref().and_then(|r| r.started_at).is_none() {
            updates.push(set(fields::STARTED_AT, now));
        }

        self.storage.write(jid, updates, expiration_secs).await?;
        debug!(jid = %jid, "job working");
        Ok(())
    }

    /// Record the attempt's outcome. `ended_at` is set once, on the first
    /// terminal write.
    pub async fn after_perform(
        &self,
        jid: &Jid,
        outcome: &Outcome,
        expiration_secs: Option<u64>,
    ) -> Result<JobStatus, StatusError> {
        let next = outcome.status();
        let record = self.current(jid).await?;

        if let Some(status) = record.as_ref().and_then(|r| r.status) {
            if status.is_terminal() {
                warn!(jid = %jid, %status, outcome = %next, "terminal status kept");
                return Ok(status);
            }
            if !status.can_transition_to(next) {
                warn!(jid = %jid, from = %status, to = %next, "unexpected transition");
            }
        }

        let mut updates = vec![set(fields::STATUS, next)];
        if next.is_terminal() && record.as_ref().and_then(|r| r.ended_at).is_none() {
            updates.push(set(fields::ENDED_AT, self.storage.clock().unix_now()));
        }

        self.storage.write(jid, updates, expiration_secs).await?;
        match outcome {
            Outcome::Retrying => info!(jid = %jid, "job will be retried"),
            Outcome::Failed(reason) => info!(jid = %jid, status = %next, %reason, "job finished"),
            _ => info!(jid = %jid, status = %next, "job finished"),
        }
        Ok(next)
    }

    async fn current(&self, jid: &Jid) -> Result<Option<StatusRecord>, StatusError> {
        let raw = self.storage.read_all(jid).await?;
        Ok(StatusRecord::from_fields(jid.clone(), &raw))
    }
}

async fn current_status(storage: &StatusStorage, jid: &Jid) -> Result<Option<JobStatus>, StatusError> {
    Ok(storage
        .read_field(jid, fields::STATUS)
        .await?
        .and_then(|s| s.parse().ok()))
}
