//! Redis adapters for `KeyValueStore`.
//!
//! Two command dialects exist in the wild:
//! - **legacy** (< 6.2): `HMSET`, `ZRANGEBYSCORE … LIMIT`, untyped `SCAN`
//! - **modern** (>= 6.2): multi-field `HSET`, `ZRANGE … BYSCORE LIMIT`, `SCAN … TYPE hash`
//!
//! `connect` probes `INFO server` once at startup and hands back the adapter
//! that matches. Everything above the port is shared.

mod legacy;
mod modern;

pub use self::legacy::LegacyRedisStore;
pub use self::modern::ModernRedisStore;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{Cmd, Pipeline, RedisError};
use tracing::{debug, info};

use crate::domain::{FieldMap, StoreError};
use crate::ports::KeyValueStore;

/// First server version that understands `ZRANGE … BYSCORE`.
pub const MODERN_SINCE: RedisVersion = RedisVersion {
    major: 6,
    minor: 2,
    patch: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RedisVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl RedisVersion {
    /// Pull `redis_version:x.y.z` out of an `INFO server` reply.
    pub fn from_info(info: &str) -> Option<Self> {
        let raw = info
            .lines()
            .find_map(|line| line.trim().strip_prefix("redis_version:"))?;
        let mut parts = raw.trim().split('.').map(|p| p.parse::<u32>().ok());
        Some(Self {
            major: parts.next().flatten()?,
            minor: parts.next().flatten().unwrap_or(0),
            patch: parts.next().flatten().unwrap_or(0),
        })
    }
}

impl fmt::Display for RedisVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    Legacy,
    Modern,
}

impl ProtocolVariant {
    /// Unknown versions get the legacy dialect, which every server accepts.
    pub fn for_version(version: Option<RedisVersion>) -> Self {
        match version {
            Some(v) if v >= MODERN_SINCE => ProtocolVariant::Modern,
            _ => ProtocolVariant::Legacy,
        }
    }
}

/// Open a connection manager, probe the server and pick the adapter.
pub async fn connect(url: &str) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    let client = redis::Client::open(url).map_err(store_error)?;
    let conn = ConnectionManager::new(client).await.map_err(store_error)?;
    let conn = RedisConnection { conn };

    let info: String = redis::cmd("INFO")
        .arg("server")
        .query_async(&mut conn.acquire())
        .await
        .map_err(store_error)?;
    let version = RedisVersion::from_info(&info);
    let variant = ProtocolVariant::for_version(version);
    let version_text = version.map_or_else(|| "unknown".to_string(), |v| v.to_string());

    let store: Arc<dyn KeyValueStore> = match variant {
        ProtocolVariant::Legacy => Arc::new(LegacyRedisStore::new(conn)),
        ProtocolVariant::Modern => Arc::new(ModernRedisStore::new(conn)),
    };
    info!(version = %version_text, protocol = store.protocol(), "connected to redis");
    Ok(store)
}

/// One `SCAN` step; the modern dialect narrows it with `TYPE`.
fn scan_cmd(cursor: u64, pattern: &str, count: usize, type_filter: Option<&str>) -> Cmd {
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(count);
    if let Some(kind) = type_filter {
        cmd.arg("TYPE").arg(kind);
    }
    cmd
}

pub(crate) fn store_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
    {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

/// Commands both dialects share.
///
/// `ConnectionManager` is a cheap handle over one multiplexed connection;
/// each call clones it for the duration of a single round trip.
#[derive(Clone)]
pub struct RedisConnection {
    conn: ConnectionManager,
}

impl RedisConnection {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn acquire(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn get_all(&self, key: &str) -> Result<FieldMap, StoreError> {
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut self.acquire())
            .await
            .map_err(store_error)
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut self.acquire())
            .await
            .map_err(store_error)
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.acquire())
            .await
            .map_err(store_error)?;
        Ok(removed > 0)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut self.acquire())
            .await
            .map_err(store_error)?;
        Ok(removed > 0)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        let _receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut self.acquire())
            .await
            .map_err(store_error)?;
        Ok(())
    }

    /// Run a `MULTI … EXEC` block built by the dialect.
    async fn exec(&self, pipe: &Pipeline) -> Result<(), StoreError> {
        let _: () = pipe
            .query_async(&mut self.acquire())
            .await
            .map_err(store_error)?;
        Ok(())
    }

    /// Cursor loop over `SCAN`; the server may return a key more than once.
    async fn scan(
        &self,
        pattern: &str,
        count: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.acquire();
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        let mut round_trips = 0usize;

        loop {
            let (next, batch): (u64, Vec<String>) = scan_cmd(cursor, pattern, count, type_filter)
                .query_async(&mut conn)
                .await
                .map_err(store_error)?;
            round_trips += 1;

            for key in batch {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, round_trips, keys = keys.len(), "scan finished");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ScoreBound;
    use rstest::rstest;

    #[test]
    fn version_is_parsed_from_info_reply() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_git_sha1:00000000\r\n";
        assert_eq!(
            RedisVersion::from_info(info),
            Some(RedisVersion {
                major: 7,
                minor: 2,
                patch: 4
            })
        );
        assert_eq!(RedisVersion::from_info("# Server\r\nos:Linux\r\n"), None);
    }

    #[test]
    fn short_versions_fill_with_zero() {
        let v = RedisVersion::from_info("redis_version:6\n").unwrap();
        assert_eq!(v.to_string(), "6.0.0");
    }

    #[rstest]
    #[case::redis_5("redis_version:5.0.14", ProtocolVariant::Legacy)]
    #[case::redis_6_0("redis_version:6.0.20", ProtocolVariant::Legacy)]
    #[case::redis_6_2("redis_version:6.2.0", ProtocolVariant::Modern)]
    #[case::redis_7("redis_version:7.4.1", ProtocolVariant::Modern)]
    #[case::unknown("server:valkey", ProtocolVariant::Legacy)]
    fn variant_follows_server_version(#[case] info: &str, #[case] expected: ProtocolVariant) {
        let version = RedisVersion::from_info(info);
        assert_eq!(ProtocolVariant::for_version(version), expected);
    }

    /// RESP encoding of one command, written out independently of the client.
    fn resp(parts: &[&str]) -> Vec<u8> {
        let mut out = format!("*{}\r\n", parts.len()).into_bytes();
        for part in parts {
            out.extend(format!("${}\r\n{part}\r\n", part.len()).into_bytes());
        }
        out
    }

    fn fields(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rstest]
    #[case::legacy(ProtocolVariant::Legacy, "HMSET")]
    #[case::modern(ProtocolVariant::Modern, "HSET")]
    fn set_fields_is_one_transaction(#[case] variant: ProtocolVariant, #[case] verb: &str) {
        let updates = fields(&[("status", "working"), ("updated_at", "1700000000")]);
        let pipe = match variant {
            ProtocolVariant::Legacy => legacy::set_fields_pipeline("jobstat:status:a", &updates, 1800),
            ProtocolVariant::Modern => modern::set_fields_pipeline("jobstat:status:a", &updates, 1800),
        };

        let expected = [
            resp(&["MULTI"]),
            resp(&[
                verb,
                "jobstat:status:a",
                "status",
                "working",
                "updated_at",
                "1700000000",
            ]),
            resp(&["EXPIRE", "jobstat:status:a", "1800"]),
            resp(&["EXEC"]),
        ]
        .concat();
        assert_eq!(pipe.get_packed_pipeline(), expected);
    }

    #[rstest]
    #[case::legacy_full_range(
        ProtocolVariant::Legacy,
        ScoreBound::NegInf,
        ScoreBound::PosInf,
        &["ZRANGEBYSCORE", "schedule", "-inf", "+inf", "LIMIT", "0", "100"]
    )]
    #[case::legacy_exact(
        ProtocolVariant::Legacy,
        ScoreBound::At(1700000000.5),
        ScoreBound::At(1700000000.5),
        &["ZRANGEBYSCORE", "schedule", "1700000000.5", "1700000000.5", "LIMIT", "0", "100"]
    )]
    #[case::modern_full_range(
        ProtocolVariant::Modern,
        ScoreBound::NegInf,
        ScoreBound::PosInf,
        &["ZRANGE", "schedule", "-inf", "+inf", "BYSCORE", "LIMIT", "0", "100"]
    )]
    #[case::modern_exact(
        ProtocolVariant::Modern,
        ScoreBound::At(1700000000.5),
        ScoreBound::At(1700000000.5),
        &["ZRANGE", "schedule", "1700000000.5", "1700000000.5", "BYSCORE", "LIMIT", "0", "100"]
    )]
    fn range_by_score_argument_order(
        #[case] variant: ProtocolVariant,
        #[case] min: ScoreBound,
        #[case] max: ScoreBound,
        #[case] expected: &[&str],
    ) {
        let cmd = match variant {
            ProtocolVariant::Legacy => legacy::range_by_score_cmd("schedule", min, max, 0, 100),
            ProtocolVariant::Modern => modern::range_by_score_cmd("schedule", min, max, 0, 100),
        };
        assert_eq!(cmd.get_packed_command(), resp(expected));
    }

    #[rstest]
    #[case::legacy(None, &["SCAN", "0", "MATCH", "jobstat:status:*", "COUNT", "100"])]
    #[case::modern(
        Some("hash"),
        &["SCAN", "0", "MATCH", "jobstat:status:*", "COUNT", "100", "TYPE", "hash"]
    )]
    fn scan_step_arguments(#[case] type_filter: Option<&str>, #[case] expected: &[&str]) {
        let cmd = scan_cmd(0, "jobstat:status:*", 100, type_filter);
        assert_eq!(cmd.get_packed_command(), resp(expected));
    }
}
