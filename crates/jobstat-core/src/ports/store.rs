//! KeyValueStore port - hash / sorted-set store (Redis または InMemory)
//!
//! One capability set over the remote store, whatever client protocol sits
//! underneath:
//! - hash read / atomic multi-field write with TTL reset
//! - key deletion and pattern scan
//! - range-by-score reads and member removal on a sorted set (schedule index)
//! - fire-and-forget publish for update notifications
//!
//! # 実装
//! - `impls::InMemoryStore`: 開発・テスト用
//! - `impls::redis::{LegacyRedisStore, ModernRedisStore}`: 本番用、起動時の probe で選択

use async_trait::async_trait;
use std::fmt;

use crate::domain::{FieldMap, StoreError};

/// One bound of a score range. Scores are unix timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    NegInf,
    PosInf,
    /// Inclusive.
    At(f64),
}

impl ScoreBound {
    pub fn contains_lower(self, score: f64) -> bool {
        match self {
            ScoreBound::NegInf => true,
            ScoreBound::PosInf => false,
            ScoreBound::At(bound) => score >= bound,
        }
    }

    pub fn contains_upper(self, score: f64) -> bool {
        match self {
            ScoreBound::NegInf => false,
            ScoreBound::PosInf => true,
            ScoreBound::At(bound) => score <= bound,
        }
    }
}

/// Redis argument form: `-inf`, `+inf` or the number.
impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::NegInf => f.write_str("-inf"),
            ScoreBound::PosInf => f.write_str("+inf"),
            ScoreBound::At(score) => write!(f, "{score}"),
        }
    }
}

/// Store port.
///
/// # 設計原則
/// - Every call is one round trip on a connection acquired for that call only
/// - Errors surface unmodified; no retry here
/// - `set_fields` is atomic per key (merge + TTL reset in one transaction)
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Adapter name for logs.
    fn protocol(&self) -> &'static str;

    /// All fields of a hash; empty when the key is absent or expired.
    async fn get_all(&self, key: &str) -> Result<FieldMap, StoreError>;

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Merge `fields` into the hash (creating it) and reset its TTL.
    async fn set_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Returns whether a key was removed. Absent keys are not an error.
    async fn delete_key(&self, key: &str) -> Result<bool, StoreError>;

    /// Every key matching a glob `pattern`, deduplicated, unordered.
    /// `count` is a per-round-trip hint.
    async fn scan_keys(&self, pattern: &str, count: usize) -> Result<Vec<String>, StoreError>;

    /// Members of a sorted set with `min <= score <= max`, ascending, sliced
    /// at `offset` for `limit`.
    async fn range_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Remove one member of a sorted set. Returns whether it was there.
    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_render_as_redis_arguments() {
        assert_eq!(ScoreBound::NegInf.to_string(), "-inf");
        assert_eq!(ScoreBound::PosInf.to_string(), "+inf");
        assert_eq!(ScoreBound::At(1700000000.0).to_string(), "1700000000");
        assert_eq!(ScoreBound::At(1.5).to_string(), "1.5");
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(ScoreBound::At(10.0).contains_lower(10.0));
        assert!(ScoreBound::At(10.0).contains_upper(10.0));
        assert!(!ScoreBound::At(10.0).contains_upper(10.5));
        assert!(ScoreBound::NegInf.contains_lower(f64::MIN));
        assert!(ScoreBound::PosInf.contains_upper(f64::MAX));
    }
}
