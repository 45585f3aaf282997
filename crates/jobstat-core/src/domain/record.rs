//! Status record: the typed view of one job's stored hash.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::ids::Jid;
use super::state::JobStatus;

/// Stored field names.
pub mod fields {
    pub const JID: &str = "jid";
    pub const STATUS: &str = "status";
    pub const WORKER: &str = "worker";
    pub const ARGS: &str = "args";
    pub const ENQUEUED_AT: &str = "enqueued_at";
    pub const STARTED_AT: &str = "started_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const ENDED_AT: &str = "ended_at";
    pub const TOTAL: &str = "total";
    pub const AT: &str = "at";
    pub const PCT_COMPLETE: &str = "pct_complete";
    pub const MESSAGE: &str = "message";
    pub const STOP: &str = "stop";

    // derived on read, never stored by the core
    pub const LABEL: &str = "label";
    pub const ELAPSED: &str = "elapsed";
    pub const ETA: &str = "eta";

    /// Keys that never land in the `custom` map.
    pub const RESERVED: [&str; 16] = [
        JID,
        STATUS,
        WORKER,
        ARGS,
        ENQUEUED_AT,
        STARTED_AT,
        UPDATED_AT,
        ENDED_AT,
        TOTAL,
        AT,
        PCT_COMPLETE,
        MESSAGE,
        STOP,
        LABEL,
        ELAPSED,
        ETA,
    ];

    pub fn is_reserved(key: &str) -> bool {
        RESERVED.contains(&key)
    }

    pub const STOP_SET: &str = "true";
}

/// Default unit count when the job never declares a total.
pub const DEFAULT_TOTAL: i64 = 100;

/// Raw stored fields of one record.
pub type FieldMap = HashMap<String, String>;

/// Typed snapshot of a status record.
///
/// Numeric fields that fail to parse read as absent; the raw values stay
/// available through `StatusStorage::read_all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub jid: Jid,
    pub status: Option<JobStatus>,
    pub worker: Option<String>,
    pub args: Option<String>,
    pub enqueued_at: Option<i64>,
    pub started_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub total: Option<i64>,
    pub at: Option<i64>,
    pub pct_complete: Option<i64>,
    pub message: Option<String>,
    pub stop: bool,
    pub custom: BTreeMap<String, String>,
}

impl StatusRecord {
    /// Parse a stored hash. `None` when the record is not present, i.e. it
    /// has fewer than two populated fields (never created, expired, or a
    /// stray partial write).
    pub fn from_fields(jid: Jid, raw: &FieldMap) -> Option<Self> {
        if !is_present(raw) {
            return None;
        }

        let text = |name: &str| raw.get(name).filter(|v| !v.is_empty()).cloned();
        let int = |name: &str| raw.get(name).and_then(|v| v.trim().parse::<i64>().ok());

        let custom = raw
            .iter()
            .filter(|(key, _)| !fields::is_reserved(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some(Self {
            jid,
            status: raw.get(fields::STATUS).and_then(|s| s.parse().ok()),
            worker: text(fields::WORKER),
            args: text(fields::ARGS),
            enqueued_at: int(fields::ENQUEUED_AT),
            started_at: int(fields::STARTED_AT),
            updated_at: int(fields::UPDATED_AT),
            ended_at: int(fields::ENDED_AT),
            total: int(fields::TOTAL),
            at: int(fields::AT),
            pct_complete: int(fields::PCT_COMPLETE),
            message: text(fields::MESSAGE),
            stop: raw.get(fields::STOP).is_some_and(|v| v == fields::STOP_SET),
            custom,
        })
    }

    /// Declared unit count, `DEFAULT_TOTAL` when never set.
    pub fn total_units(&self) -> i64 {
        self.total.unwrap_or(DEFAULT_TOTAL)
    }

    pub fn units_completed(&self) -> i64 {
        self.at.unwrap_or(0)
    }
}

/// Fewer than two populated fields means "not present".
pub fn is_present(raw: &FieldMap) -> bool {
    raw.values().filter(|v| !v.is_empty()).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn single_field_record_is_not_present() {
        let map = raw(&[("stop", "true")]);
        assert!(StatusRecord::from_fields(Jid::new("a"), &map).is_none());
        assert!(StatusRecord::from_fields(Jid::new("a"), &FieldMap::new()).is_none());
    }

    #[test]
    fn custom_fields_exclude_reserved_keys() {
        let map = raw(&[
            ("jid", "a"),
            ("status", "working"),
            ("at", "10"),
            ("stop", "true"),
            ("mister_cat", "meow"),
        ]);
        let record = StatusRecord::from_fields(Jid::new("a"), &map).unwrap();

        assert_eq!(record.status, Some(JobStatus::Working));
        assert_eq!(record.at, Some(10));
        assert!(record.stop);
        assert_eq!(record.custom.len(), 1);
        assert_eq!(record.custom["mister_cat"], "meow");
    }

    #[test]
    fn unparsable_numbers_read_as_absent() {
        let map = raw(&[("status", "working"), ("total", "lots"), ("message", "")]);
        let record = StatusRecord::from_fields(Jid::new("a"), &map).unwrap();

        assert_eq!(record.total, None);
        assert_eq!(record.total_units(), DEFAULT_TOTAL);
        assert_eq!(record.message, None);
    }

    #[test]
    fn empty_values_do_not_count_towards_presence() {
        let map = raw(&[("status", "queued"), ("message", "")]);
        assert!(!is_present(&map));
    }
}
