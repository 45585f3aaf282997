//! ListingAggregator - filtered, sorted, paginated views over all live records.
//!
//! # フロー
//! 1. scan the store for every key under the status prefix, dedupe jids
//! 2. read each record, drop the ones that are not present (expired between
//!    scan and read is expected and tolerated)
//! 3. enrich with label, percent, elapsed, ETA and the `custom` map
//! 4. filter by exact status
//! 5. sort by an allow-listed column, missing values last
//! 6. slice one page
//!
//! O(N) per query with no secondary index; fine for the hundreds of records
//! alive within one TTL window, not for millions.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::storage::StatusStorage;
use crate::domain::progress;
use crate::domain::{Jid, JobStatus, StatusError, StatusLabel, StatusRecord};

/// Columns a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Worker,
    Status,
    UpdatedAt,
    PctComplete,
    Message,
    Args,
    Elapsed,
    Eta,
}

impl SortColumn {
    /// Default allow-list. ETA is displayed but not sortable.
    pub const SORTABLE: [SortColumn; 7] = [
        SortColumn::Worker,
        SortColumn::Status,
        SortColumn::UpdatedAt,
        SortColumn::PctComplete,
        SortColumn::Message,
        SortColumn::Args,
        SortColumn::Elapsed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortColumn::Worker => "worker",
            SortColumn::Status => "status",
            SortColumn::UpdatedAt => "updated_at",
            SortColumn::PctComplete => "pct_complete",
            SortColumn::Message => "message",
            SortColumn::Args => "args",
            SortColumn::Elapsed => "elapsed",
            SortColumn::Eta => "eta",
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            SortColumn::Worker,
            SortColumn::Status,
            SortColumn::UpdatedAt,
            SortColumn::PctComplete,
            SortColumn::Message,
            SortColumn::Args,
            SortColumn::Elapsed,
            SortColumn::Eta,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
        .ok_or_else(|| format!("unknown sort column: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(format!("unknown sort direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSize {
    Count(usize),
    All,
}

impl FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(PageSize::All);
        }
        s.parse::<usize>()
            .map(PageSize::Count)
            .map_err(|_| format!("page size must be a number or \"all\": {s}"))
    }
}

/// Listing request. `Default` lists everything, newest update first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    /// `None` means all statuses.
    pub status: Option<JobStatus>,
    /// Falls back to the configured default when absent or not allow-listed.
    pub sort_by: Option<SortColumn>,
    pub sort_dir: SortDir,
    /// 1-based; values below 1 read as 1.
    pub page: usize,
    /// `None` uses the configured default page size.
    pub per_page: Option<PageSize>,
}

/// A status record plus everything derived from it on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedStatus {
    pub jid: Jid,
    pub status: Option<JobStatus>,
    pub label: StatusLabel,
    pub worker: Option<String>,
    pub args: Option<String>,
    pub message: Option<String>,
    pub enqueued_at: Option<i64>,
    pub started_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub total: i64,
    pub at: i64,
    pub pct_complete: i64,
    /// Seconds.
    pub elapsed: Option<i64>,
    /// Seconds, only while `working`.
    pub eta: Option<f64>,
    pub custom: BTreeMap<String, String>,
}

impl EnrichedStatus {
    pub fn from_record(record: StatusRecord, now: i64) -> Self {
        let label = record
            .status
            .map(JobStatus::label)
            .unwrap_or(StatusLabel::Danger);
        let pct_complete = progress::percent_complete(&record);
        let elapsed = progress::elapsed(&record, now);
        let eta = match record.status {
            Some(JobStatus::Working) => progress::estimated_time_remaining(&record, now),
            _ => None,
        };
        let total = record.total_units();
        let at = record.units_completed();

        Self {
            jid: record.jid,
            status: record.status,
            label,
            worker: record.worker,
            args: record.args,
            message: record.message,
            enqueued_at: record.enqueued_at,
            started_at: record.started_at,
            updated_at: record.updated_at,
            ended_at: record.ended_at,
            total,
            at,
            pct_complete,
            elapsed,
            eta,
            custom: record.custom,
        }
    }

    fn sort_key(&self, column: SortColumn) -> Option<SortKey> {
        match column {
            SortColumn::Worker => self.worker.clone().map(SortKey::Text),
            SortColumn::Status => self.status.map(|s| SortKey::Text(s.as_str().to_string())),
            SortColumn::UpdatedAt => self.updated_at.map(SortKey::Int),
            SortColumn::PctComplete => Some(SortKey::Int(self.pct_complete)),
            SortColumn::Message => self.message.clone().map(SortKey::Text),
            SortColumn::Args => self.args.clone().map(SortKey::Text),
            SortColumn::Elapsed => self.elapsed.map(SortKey::Int),
            SortColumn::Eta => self.eta.map(SortKey::Float),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SortKey {
    /// `None` for mismatched kinds, which a single column never produces.
    fn compare(&self, other: &SortKey) -> Option<Ordering> {
        match (self, other) {
            (SortKey::Int(a), SortKey::Int(b)) => Some(a.cmp(b)),
            (SortKey::Float(a), SortKey::Float(b)) => Some(a.total_cmp(b)),
            (SortKey::Text(a), SortKey::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Missing or incomparable values sort last in either direction.
fn compare_keys(a: Option<&SortKey>, b: Option<&SortKey>, dir: SortDir) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => match x.compare(y) {
            Some(order) if dir == SortDir::Desc => order.reverse(),
            Some(order) => order,
            None => Ordering::Equal,
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub records: Vec<EnrichedStatus>,
    /// Matching records before pagination.
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub sort_by: SortColumn,
    pub sort_dir: SortDir,
}

pub struct ListingAggregator {
    storage: StatusStorage,
}

impl ListingAggregator {
    pub fn new(storage: StatusStorage) -> Self {
        Self { storage }
    }

    /// Every live record, enriched, in scan order.
    pub async fn collect(&self) -> Result<Vec<EnrichedStatus>, StatusError> {
        let now = self.storage.clock().unix_now();
        let jids = self.storage.scan_jids().await?;
        let scanned = jids.len();

        let mut statuses = Vec::with_capacity(scanned);
        for jid in jids {
            let raw = self.storage.read_all(&jid).await?;
            // expired between scan and read
            let Some(record) = StatusRecord::from_fields(jid, &raw) else {
                continue;
            };
            statuses.push(EnrichedStatus::from_record(record, now));
        }

        debug!(scanned, live = statuses.len(), "status records collected");
        Ok(statuses)
    }

    pub async fn list(&self, query: &ListQuery) -> Result<JobListing, StatusError> {
        let statuses = self.collect().await?;
        Ok(self.arrange(statuses, query))
    }

    /// Filter, sort and paginate already collected records.
    pub fn arrange(&self, statuses: Vec<EnrichedStatus>, query: &ListQuery) -> JobListing {
        let config = self.storage.config();

        let sort_by = query
            .sort_by
            .filter(|column| config.is_sortable(*column))
            .unwrap_or(config.default_sort);
        let sort_dir = query.sort_dir;

        let mut statuses: Vec<EnrichedStatus> = match query.status {
            Some(wanted) => statuses
                .into_iter()
                .filter(|s| s.status == Some(wanted))
                .collect(),
            None => statuses,
        };

        statuses.sort_by(|a, b| {
            compare_keys(
                a.sort_key(sort_by).as_ref(),
                b.sort_key(sort_by).as_ref(),
                sort_dir,
            )
            .then_with(|| a.jid.cmp(&b.jid))
        });

        let total = statuses.len();
        let page = query.page.max(1);
        let per_page = match query.per_page {
            Some(PageSize::All) => total,
            Some(PageSize::Count(n)) if config.allows_per_page(n) => n,
            _ => config.default_per_page,
        };

        let records = statuses
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        JobListing {
            records,
            total,
            page,
            per_page,
            sort_by,
            sort_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::StatusConfig;
    use crate::app::storage::set;
    use crate::impls::InMemoryStore;
    use crate::ports::FixedClock;
    use chrono::Duration;
    use rstest::rstest;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<FixedClock>,
        storage: StatusStorage,
        listing: ListingAggregator,
    }

    fn fixture() -> Fixture {
        fixture_with(StatusConfig::default())
    }

    fn fixture_with(config: StatusConfig) -> Fixture {
        let clock = Arc::new(FixedClock::at_unix(NOW));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let storage = StatusStorage::new(store, clock.clone(), Arc::new(config));
        Fixture {
            clock,
            listing: ListingAggregator::new(storage.clone()),
            storage,
        }
    }

    async fn seed(f: &Fixture, jid: &str, status: &str, extra: &[(&str, &str)]) {
        let mut updates = vec![set("jid", jid), set("status", status), set("worker", "Report")];
        updates.extend(extra.iter().map(|(k, v)| set(k, v)));
        f.storage.write(&Jid::new(jid), updates, None).await.unwrap();
    }

    fn jids(listing: &JobListing) -> Vec<&str> {
        listing.records.iter().map(|r| r.jid.as_str()).collect()
    }

    #[tokio::test]
    async fn filter_returns_exactly_the_matching_status() {
        let f = fixture();
        seed(&f, "a", "complete", &[]).await;
        seed(&f, "b", "working", &[]).await;
        seed(&f, "c", "failed", &[]).await;
        seed(&f, "d", "working", &[]).await;

        let query = ListQuery {
            status: Some(JobStatus::Working),
            per_page: Some(PageSize::All),
            ..ListQuery::default()
        };
        let listing = f.listing.list(&query).await.unwrap();

        assert_eq!(listing.total, 2);
        assert!(listing
            .records
            .iter()
            .all(|r| r.status == Some(JobStatus::Working)));
    }

    #[tokio::test]
    async fn updated_at_ascending_is_non_decreasing() {
        let f = fixture();
        for (i, jid) in ["x", "y", "z", "w"].iter().enumerate() {
            f.clock.set(chrono::DateTime::from_timestamp(NOW + 10 - i as i64 * 3, 0).unwrap());
            seed(&f, jid, "working", &[]).await;
        }

        let query = ListQuery {
            sort_by: Some(SortColumn::UpdatedAt),
            sort_dir: SortDir::Asc,
            ..ListQuery::default()
        };
        let listing = f.listing.list(&query).await.unwrap();

        let times: Vec<i64> = listing
            .records
            .iter()
            .map(|r| r.updated_at.unwrap())
            .collect();
        assert_eq!(times.len(), 4);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn pagination_reports_total_before_slicing() {
        let f = fixture_with(StatusConfig {
            per_page_options: vec![2, 25],
            ..StatusConfig::default()
        });
        seed(&f, "a", "complete", &[]).await;
        seed(&f, "b", "failed", &[]).await;
        seed(&f, "c", "working", &[]).await;

        let query = ListQuery {
            status: None,
            sort_by: Some(SortColumn::Status),
            sort_dir: SortDir::Asc,
            page: 1,
            per_page: Some(PageSize::Count(2)),
        };
        let listing = f.listing.list(&query).await.unwrap();
        assert_eq!(listing.total, 3);
        assert_eq!(jids(&listing), vec!["a", "b"]);

        let second = f
            .listing
            .list(&ListQuery { page: 2, ..query.clone() })
            .await
            .unwrap();
        assert_eq!(jids(&second), vec!["c"]);

        let beyond = f
            .listing
            .list(&ListQuery { page: 9, ..query })
            .await
            .unwrap();
        assert!(beyond.records.is_empty());
        assert_eq!(beyond.total, 3);
    }

    #[tokio::test]
    async fn missing_values_sort_last_in_both_directions() {
        let f = fixture();
        seed(&f, "a", "working", &[("message", "beta")]).await;
        seed(&f, "b", "working", &[]).await;
        seed(&f, "c", "working", &[("message", "alpha")]).await;

        for (dir, expected) in [
            (SortDir::Asc, vec!["c", "a", "b"]),
            (SortDir::Desc, vec!["a", "c", "b"]),
        ] {
            let query = ListQuery {
                sort_by: Some(SortColumn::Message),
                sort_dir: dir,
                ..ListQuery::default()
            };
            let listing = f.listing.list(&query).await.unwrap();
            assert_eq!(jids(&listing), expected);
        }
    }

    #[rstest]
    #[case::not_allow_listed(Some(SortColumn::Eta))]
    #[case::absent(None)]
    fn unsortable_columns_fall_back_to_default(#[case] sort_by: Option<SortColumn>) {
        let f = fixture();
        let listing = f.listing.arrange(
            Vec::new(),
            &ListQuery {
                sort_by,
                ..ListQuery::default()
            },
        );
        assert_eq!(listing.sort_by, SortColumn::UpdatedAt);
        assert_eq!(listing.sort_dir, SortDir::Desc);
        assert_eq!(listing.page, 1);
        assert_eq!(listing.per_page, 25);
    }

    #[rstest]
    #[case::offered(Some(PageSize::Count(50)), 50)]
    #[case::not_offered(Some(PageSize::Count(7)), 25)]
    #[case::zero(Some(PageSize::Count(0)), 25)]
    #[case::all(Some(PageSize::All), 0)]
    fn page_size_must_be_an_offered_option(
        #[case] per_page: Option<PageSize>,
        #[case] expected: usize,
    ) {
        let f = fixture();
        let listing = f.listing.arrange(
            Vec::new(),
            &ListQuery {
                per_page,
                ..ListQuery::default()
            },
        );
        assert_eq!(listing.per_page, expected);
    }

    #[tokio::test]
    async fn expired_and_partial_records_are_skipped() {
        let f = fixture();
        seed(&f, "old", "complete", &[]).await;
        f.clock.advance(Duration::seconds(1801));
        seed(&f, "new", "queued", &[]).await;
        // a lone stop flag is not a record
        f.storage
            .write(&Jid::new("stray"), Vec::new(), None)
            .await
            .unwrap();

        let listing = f.listing.list(&ListQuery::default()).await.unwrap();
        assert_eq!(jids(&listing), vec!["new"]);
    }

    #[tokio::test]
    async fn enrichment_derives_display_fields() {
        let f = fixture();
        seed(
            &f,
            "a",
            "working",
            &[
                ("started_at", "1699999950"),
                ("at", "25"),
                ("total", "100"),
                ("mister_cat", "meow"),
            ],
        )
        .await;
        seed(&f, "b", "complete", &[("at", "3"), ("total", "10")]).await;

        let listing = f
            .listing
            .list(&ListQuery {
                sort_by: Some(SortColumn::PctComplete),
                ..ListQuery::default()
            })
            .await
            .unwrap();

        let done = &listing.records[0];
        assert_eq!(done.jid.as_str(), "b");
        assert_eq!(done.pct_complete, 100);
        assert_eq!(done.label, StatusLabel::Success);
        assert_eq!(done.eta, None);

        let running = &listing.records[1];
        assert_eq!(running.pct_complete, 25);
        assert_eq!(running.label, StatusLabel::Warning);
        assert_eq!(running.elapsed, Some(50));
        assert_eq!(running.eta, Some(150.0));
        assert_eq!(running.custom.get("mister_cat").map(String::as_str), Some("meow"));
        assert!(!running.custom.contains_key("worker"));
    }

    #[test]
    fn page_size_parses_all() {
        assert_eq!("all".parse::<PageSize>().unwrap(), PageSize::All);
        assert_eq!("50".parse::<PageSize>().unwrap(), PageSize::Count(50));
        assert!("many".parse::<PageSize>().is_err());
    }
}
