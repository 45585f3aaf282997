//! ProgressReporter - the in-job progress API.
//!
//! Handed to a running job by the runtime. Every call writes through
//! `StatusStorage` and then re-reads the `stop` flag; when it is set the call
//! returns `StatusError::StoppedByRequest`, which the job body propagates with
//! `?`. That is the only point where a running job observes a stop request.

use tracing::warn;

use crate::app::storage::{FieldWrite, StatusStorage, set};
use crate::domain::progress::percent_of;
use crate::domain::{DEFAULT_TOTAL, Jid, StatusError, fields};

pub struct ProgressReporter {
    storage: StatusStorage,
    jid: Jid,
    /// Per-worker TTL; `None` uses the configured default.
    expiration_secs: Option<u64>,
}

impl ProgressReporter {
    pub fn new(storage: StatusStorage, jid: Jid, expiration_secs: Option<u64>) -> Self {
        Self {
            storage,
            jid,
            expiration_secs,
        }
    }

    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    /// Declare the unit count `at` is measured against.
    pub async fn total(&mut self, total: i64) -> Result<(), StatusError> {
        self.write_checked(vec![set(fields::TOTAL, total)]).await
    }

    /// Report `at` units done. `message` replaces the previous annotation; a
    /// `None` leaves it as is.
    pub async fn at(&mut self, at: i64, message: Option<&str>) -> Result<(), StatusError> {
        let total = self
            .storage
            .read_field(&self.jid, fields::TOTAL)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_TOTAL);

        let mut updates = vec![
            set(fields::AT, at),
            set(fields::TOTAL, total),
            set(fields::PCT_COMPLETE, percent_of(at, total)),
        ];
        if let Some(message) = message {
            updates.push(set(fields::MESSAGE, message));
        }
        self.write_checked(updates).await
    }

    /// Attach custom fields. Reserved names are dropped.
    pub async fn store<K, V>(
        &mut self,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), StatusError>
    where
        K: AsRef<str>,
        V: ToString,
    {
        let mut updates = Vec::new();
        for (name, value) in values {
            let name = name.as_ref();
            if fields::is_reserved(name) {
                warn!(jid = %self.jid, field = name, "reserved field name ignored");
                continue;
            }
            updates.push(set(name, value));
        }
        self.write_checked(updates).await
    }

    pub async fn retrieve(&self, name: &str) -> Result<Option<String>, StatusError> {
        self.storage.read_field(&self.jid, name).await
    }

    async fn write_checked(&self, updates: Vec<FieldWrite>) -> Result<(), StatusError> {
        self.storage
            .write(&self.jid, updates, self.expiration_secs)
            .await?;
        self.check_stop().await
    }

    async fn check_stop(&self) -> Result<(), StatusError> {
        let flag = self.storage.read_field(&self.jid, fields::STOP).await?;
        if flag.as_deref() == Some(fields::STOP_SET) {
            return Err(StatusError::StoppedByRequest {
                jid: self.jid.clone(),
            });
        }
        Ok(())
    }
}
