//! Runtime - runs one execution attempt of a tracked job.
//!
//! The host job system owns dequeueing and retry scheduling; it calls
//! `Runtime::execute` once per attempt. The runtime wraps the job body in
//! the execution hooks and hands it a `ProgressReporter`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{Instrument, info_span};

use crate::app::hooks::{ExecutionHooks, Outcome};
use crate::app::progress::ProgressReporter;
use crate::app::storage::StatusStorage;
use crate::domain::{Jid, JobError, JobStatus, StatusError};

/// A job body whose lifecycle is tracked.
///
/// # 使用例
/// ```ignore
/// struct Export;
///
/// #[async_trait]
/// impl StatusJob for Export {
///     fn name(&self) -> &str { "Export" }
///
///     async fn perform(&self, progress: &mut ProgressReporter, args: &Value) -> Result<(), JobError> {
///         progress.total(10).await?;
///         for i in 1..=10 {
///             progress.at(i, None).await?; // returns Err once a stop is requested
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait StatusJob: Send + Sync {
    /// Worker name stored in the record and used for registry lookup.
    fn name(&self) -> &str;

    /// TTL override for this worker's records.
    fn expiration(&self) -> Option<u64> {
        None
    }

    async fn perform(&self, progress: &mut ProgressReporter, args: &Value) -> Result<(), JobError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Registry of jobs (worker name -> job).
///
/// Built during initialization, read-only afterwards.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Arc<dyn StatusJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job: Arc<dyn StatusJob>) -> Result<(), RegistryError> {
        let name = job.name().to_string();
        if self.jobs.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.jobs.insert(name, job);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn StatusJob>> {
        self.jobs.get(name)
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no job registered for worker '{0}'")]
    UnknownWorker(String),

    /// A hook could not write the record.
    #[error(transparent)]
    Status(#[from] StatusError),
}

pub struct Runtime {
    registry: Arc<JobRegistry>,
    storage: StatusStorage,
    hooks: ExecutionHooks,
}

impl Runtime {
    pub fn new(registry: Arc<JobRegistry>, storage: StatusStorage) -> Self {
        Self {
            registry,
            hooks: ExecutionHooks::new(storage.clone()),
            storage,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Run one attempt and return the status it left behind.
    ///
    /// `retries_remaining` tells the hooks whether a failure is `retrying` or
    /// `failed`; the host decides whether to schedule another attempt.
    pub async fn execute(
        &self,
        jid: &Jid,
        worker: &str,
        args: &Value,
        retries_remaining: bool,
    ) -> Result<JobStatus, RuntimeError> {
        let job = self
            .registry
            .get(worker)
            .ok_or_else(|| RuntimeError::UnknownWorker(worker.to_string()))?
            .clone();

        let span = info_span!("job", jid = %jid, worker);
        async move {
            let expiration = job.expiration();
            self.hooks.before_perform(jid, worker, expiration).await?;

            let mut progress = ProgressReporter::new(self.storage.clone(), jid.clone(), expiration);
            let result = job.perform(&mut progress, args).await;

            let outcome = Outcome::from_result(&result, retries_remaining);
            let status = self.hooks.after_perform(jid, &outcome, expiration).await?;
            Ok::<_, RuntimeError>(status)
        }
        .instrument(span)
        .await
    }
}
