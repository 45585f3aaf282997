//! StatusTracker - the read and operator API over status records.
//!
//! Reads never fabricate a default record: an absent or expired job is
//! `NotFound` (or `None` for the optional accessors), never zero progress.

use tracing::info;

use crate::app::listing::{EnrichedStatus, JobListing, ListQuery, ListingAggregator};
use crate::app::storage::{StatusStorage, set};
use crate::domain::progress;
use crate::domain::record::is_present;
use crate::domain::{FieldMap, Jid, JobStatus, StatusError, StatusRecord, fields};

pub struct StatusTracker {
    storage: StatusStorage,
    listing: ListingAggregator,
}

impl StatusTracker {
    pub fn new(storage: StatusStorage) -> Self {
        Self {
            listing: ListingAggregator::new(storage.clone()),
            storage,
        }
    }

    fn now(&self) -> i64 {
        self.storage.clock().unix_now()
    }

    /// The typed record, `NotFound` when not present.
    pub async fn record(&self, jid: &Jid) -> Result<StatusRecord, StatusError> {
        let raw = self.storage.read_all(jid).await?;
        StatusRecord::from_fields(jid.clone(), &raw)
            .ok_or_else(|| StatusError::NotFound { jid: jid.clone() })
    }

    async fn try_record(&self, jid: &Jid) -> Result<Option<StatusRecord>, StatusError> {
        match self.record(jid).await {
            Ok(record) => Ok(Some(record)),
            Err(StatusError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Single-record view with every derived field.
    pub async fn find(&self, jid: &Jid) -> Result<EnrichedStatus, StatusError> {
        let record = self.record(jid).await?;
        Ok(EnrichedStatus::from_record(record, self.now()))
    }

    /// One raw field, `None` when the record is not present.
    pub async fn get_field(&self, jid: &Jid, name: &str) -> Result<Option<String>, StatusError> {
        Ok(self.get_all_fields(jid).await?.remove(name))
    }

    /// Raw fields, empty when the record is not present.
    pub async fn get_all_fields(&self, jid: &Jid) -> Result<FieldMap, StatusError> {
        let raw = self.storage.read_all(jid).await?;
        if is_present(&raw) {
            Ok(raw)
        } else {
            Ok(FieldMap::new())
        }
    }

    pub async fn current_status(&self, jid: &Jid) -> Result<Option<JobStatus>, StatusError> {
        Ok(self.try_record(jid).await?.and_then(|r| r.status))
    }

    pub async fn is_in_state(&self, jid: &Jid, state: JobStatus) -> Result<bool, StatusError> {
        Ok(self.current_status(jid).await? == Some(state))
    }

    pub async fn is_queued(&self, jid: &Jid) -> Result<bool, StatusError> {
        self.is_in_state(jid, JobStatus::Queued).await
    }

    pub async fn is_working(&self, jid: &Jid) -> Result<bool, StatusError> {
        self.is_in_state(jid, JobStatus::Working).await
    }

    pub async fn is_retrying(&self, jid: &Jid) -> Result<bool, StatusError> {
        self.is_in_state(jid, JobStatus::Retrying).await
    }

    pub async fn is_complete(&self, jid: &Jid) -> Result<bool, StatusError> {
        self.is_in_state(jid, JobStatus::Complete).await
    }

    pub async fn is_stopped(&self, jid: &Jid) -> Result<bool, StatusError> {
        self.is_in_state(jid, JobStatus::Stopped).await
    }

    pub async fn is_failed(&self, jid: &Jid) -> Result<bool, StatusError> {
        self.is_in_state(jid, JobStatus::Failed).await
    }

    pub async fn is_interrupted(&self, jid: &Jid) -> Result<bool, StatusError> {
        self.is_in_state(jid, JobStatus::Interrupted).await
    }

    pub async fn percent_complete(&self, jid: &Jid) -> Result<i64, StatusError> {
        Ok(progress::percent_complete(&self.record(jid).await?))
    }

    /// Seconds; `None` before the job starts.
    pub async fn elapsed(&self, jid: &Jid) -> Result<Option<i64>, StatusError> {
        Ok(progress::elapsed(&self.record(jid).await?, self.now()))
    }

    /// Linear projection in seconds; `None` until some progress is reported.
    pub async fn estimated_time_remaining(&self, jid: &Jid) -> Result<Option<f64>, StatusError> {
        Ok(progress::estimated_time_remaining(
            &self.record(jid).await?,
            self.now(),
        ))
    }

    pub async fn total_units(&self, jid: &Jid) -> Result<i64, StatusError> {
        Ok(self.record(jid).await?.total_units())
    }

    pub async fn units_completed(&self, jid: &Jid) -> Result<i64, StatusError> {
        Ok(self.record(jid).await?.units_completed())
    }

    pub async fn message(&self, jid: &Jid) -> Result<Option<String>, StatusError> {
        Ok(self.record(jid).await?.message)
    }

    pub async fn enqueued_at(&self, jid: &Jid) -> Result<Option<i64>, StatusError> {
        Ok(self.record(jid).await?.enqueued_at)
    }

    pub async fn started_at(&self, jid: &Jid) -> Result<Option<i64>, StatusError> {
        Ok(self.record(jid).await?.started_at)
    }

    pub async fn updated_at(&self, jid: &Jid) -> Result<Option<i64>, StatusError> {
        Ok(self.record(jid).await?.updated_at)
    }

    pub async fn ended_at(&self, jid: &Jid) -> Result<Option<i64>, StatusError> {
        Ok(self.record(jid).await?.ended_at)
    }

    /// Raise the stop flag. The job notices on its next progress call.
    ///
    /// A flag on a finished job is harmless and ignored.
    pub async fn request_stop(&self, jid: &Jid) -> Result<(), StatusError> {
        let record = self.record(jid).await?;
        self.storage
            .write(jid, vec![set(fields::STOP, fields::STOP_SET)], None)
            .await?;
        info!(jid = %jid, status = ?record.status, "stop requested");
        Ok(())
    }

    /// Drop the job from the schedule index and delete its record.
    ///
    /// Returns whether the schedule held the job. The record is deleted
    /// either way.
    pub async fn cancel(&self, jid: &Jid, scheduled_at: Option<f64>) -> Result<bool, StatusError> {
        let unscheduled = self.storage.unschedule(jid, scheduled_at).await?;
        let deleted = self.storage.delete(jid).await?;
        info!(jid = %jid, unscheduled, deleted, "job cancelled");
        Ok(unscheduled)
    }

    /// Idempotent.
    pub async fn delete(&self, jid: &Jid) -> Result<bool, StatusError> {
        self.storage.delete(jid).await
    }

    pub async fn list_jobs(&self, query: &ListQuery) -> Result<JobListing, StatusError> {
        self.listing.list(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::StatusConfig;
    use crate::app::hooks::{ExecutionHooks, Outcome};
    use crate::app::progress::ProgressReporter;
    use crate::impls::InMemoryStore;
    use crate::ports::FixedClock;
    use chrono::Duration;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<FixedClock>,
        store: Arc<InMemoryStore>,
        storage: StatusStorage,
        tracker: StatusTracker,
        hooks: ExecutionHooks,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::at_unix(NOW));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let storage = StatusStorage::new(
            store.clone(),
            clock.clone(),
            Arc::new(StatusConfig::default()),
        );
        Fixture {
            clock,
            store,
            tracker: StatusTracker::new(storage.clone()),
            hooks: ExecutionHooks::new(storage.clone()),
            storage,
        }
    }

    #[tokio::test]
    async fn absent_jobs_are_not_found() {
        let f = fixture();
        let jid = Jid::new("ghost");

        assert!(f.tracker.find(&jid).await.unwrap_err().is_not_found());
        assert!(f.tracker.percent_complete(&jid).await.unwrap_err().is_not_found());
        assert!(f.tracker.request_stop(&jid).await.unwrap_err().is_not_found());
        assert_eq!(f.tracker.current_status(&jid).await.unwrap(), None);
        assert!(f.tracker.get_all_fields(&jid).await.unwrap().is_empty());
        assert!(!f.tracker.is_working(&jid).await.unwrap());
    }

    #[tokio::test]
    async fn expired_record_reads_as_never_created() {
        let f = fixture();
        let jid = Jid::new("a");
        f.hooks.before_perform(&jid, "Report", None).await.unwrap();
        assert!(f.tracker.is_working(&jid).await.unwrap());

        f.clock.advance(Duration::seconds(1800));
        assert!(f.tracker.find(&jid).await.unwrap_err().is_not_found());
        assert_eq!(f.tracker.get_field(&jid, "status").await.unwrap(), None);
        assert_eq!(f.tracker.list_jobs(&ListQuery::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn single_field_record_hides_every_field() {
        let f = fixture();
        let jid = Jid::new("stray");
        // a write with no updates leaves only updated_at behind
        f.storage.write(&jid, Vec::new(), None).await.unwrap();

        assert!(f.tracker.get_all_fields(&jid).await.unwrap().is_empty());
        assert_eq!(f.tracker.get_field(&jid, "updated_at").await.unwrap(), None);
        assert!(f.tracker.find(&jid).await.unwrap_err().is_not_found());

        f.storage
            .write(&jid, vec![crate::app::storage::set("status", "queued")], None)
            .await
            .unwrap();
        assert_eq!(
            f.tracker.get_field(&jid, "updated_at").await.unwrap().as_deref(),
            Some("1700000000")
        );
    }

    #[tokio::test]
    async fn stop_request_ends_the_job_as_stopped() {
        let f = fixture();
        let jid = Jid::new("a");
        f.hooks.before_perform(&jid, "Report", None).await.unwrap();
        let mut progress = ProgressReporter::new(f.storage.clone(), jid.clone(), None);

        progress.total(100).await.unwrap();
        progress.at(10, None).await.unwrap();
        assert_eq!(f.tracker.percent_complete(&jid).await.unwrap(), 10);

        f.tracker.request_stop(&jid).await.unwrap();
        assert!(f.tracker.is_working(&jid).await.unwrap());

        let err = progress.at(20, None).await.unwrap_err();
        let outcome = Outcome::from_result(&Err(err.into()), true);
        f.hooks.after_perform(&jid, &outcome, None).await.unwrap();

        assert_eq!(f.tracker.current_status(&jid).await.unwrap(), Some(JobStatus::Stopped));
        assert!(f.tracker.is_stopped(&jid).await.unwrap());
        assert_eq!(f.tracker.ended_at(&jid).await.unwrap(), Some(NOW));
    }

    #[tokio::test]
    async fn timing_accessors_follow_the_clock() {
        let f = fixture();
        let jid = Jid::new("a");
        f.hooks.before_perform(&jid, "Report", None).await.unwrap();
        let mut progress = ProgressReporter::new(f.storage.clone(), jid.clone(), None);

        f.clock.advance(Duration::seconds(20));
        progress.total(50).await.unwrap();
        progress.at(10, Some("ten down")).await.unwrap();

        assert_eq!(f.tracker.started_at(&jid).await.unwrap(), Some(NOW));
        assert_eq!(f.tracker.updated_at(&jid).await.unwrap(), Some(NOW + 20));
        assert_eq!(f.tracker.elapsed(&jid).await.unwrap(), Some(20));
        assert_eq!(
            f.tracker.estimated_time_remaining(&jid).await.unwrap(),
            Some(80.0)
        );
        assert_eq!(f.tracker.total_units(&jid).await.unwrap(), 50);
        assert_eq!(f.tracker.units_completed(&jid).await.unwrap(), 10);
        assert_eq!(f.tracker.message(&jid).await.unwrap().as_deref(), Some("ten down"));

        f.clock.advance(Duration::seconds(10));
        f.hooks
            .after_perform(&jid, &Outcome::Complete, None)
            .await
            .unwrap();
        f.clock.advance(Duration::seconds(100));
        assert_eq!(f.tracker.elapsed(&jid).await.unwrap(), Some(30));
        assert_eq!(f.tracker.percent_complete(&jid).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn delete_twice_is_a_no_op() {
        let f = fixture();
        let jid = Jid::new("a");
        f.hooks.before_perform(&jid, "Report", None).await.unwrap();

        assert!(f.tracker.delete(&jid).await.unwrap());
        assert!(!f.tracker.delete(&jid).await.unwrap());
        assert_eq!(f.tracker.current_status(&jid).await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancel_unschedules_and_deletes() {
        let f = fixture();
        let jid = Jid::new("later");
        f.store
            .add_scheduled("schedule", 1_700_000_600.0, r#"{"jid":"later","class":"Report"}"#)
            .unwrap();
        f.storage
            .write(&jid, vec![set("jid", "later"), set("status", "queued")], None)
            .await
            .unwrap();

        assert!(f.tracker.cancel(&jid, Some(1_700_000_600.0)).await.unwrap());
        assert!(f.tracker.find(&jid).await.unwrap_err().is_not_found());
        assert!(!f.tracker.cancel(&jid, None).await.unwrap());
    }
}
