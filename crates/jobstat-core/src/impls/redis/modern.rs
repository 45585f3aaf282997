//! Modern dialect: 6.2 and newer.

use async_trait::async_trait;
use redis::{Cmd, Pipeline};

use super::{RedisConnection, store_error};
use crate::domain::{FieldMap, StoreError};
use crate::ports::{KeyValueStore, ScoreBound};

pub struct ModernRedisStore {
    conn: RedisConnection,
}

impl ModernRedisStore {
    pub fn new(conn: RedisConnection) -> Self {
        Self { conn }
    }
}

/// Multi-field `HSET` then `EXPIRE` in one `MULTI … EXEC`.
pub(super) fn set_fields_pipeline(key: &str, fields: &[(String, String)], ttl_secs: u64) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic().cmd("HSET").arg(key);
    for (name, value) in fields {
        pipe.arg(name).arg(value);
    }
    pipe.ignore().cmd("EXPIRE").arg(key).arg(ttl_secs).ignore();
    pipe
}

/// `ZRANGE key min max BYSCORE LIMIT offset count`
pub(super) fn range_by_score_cmd(
    key: &str,
    min: ScoreBound,
    max: ScoreBound,
    offset: usize,
    limit: usize,
) -> Cmd {
    let mut cmd = redis::cmd("ZRANGE");
    cmd.arg(key)
        .arg(min.to_string())
        .arg(max.to_string())
        .arg("BYSCORE")
        .arg("LIMIT")
        .arg(offset)
        .arg(limit);
    cmd
}

#[async_trait]
impl KeyValueStore for ModernRedisStore {
    fn protocol(&self) -> &'static str {
        "redis-modern"
    }

    async fn get_all(&self, key: &str) -> Result<FieldMap, StoreError> {
        self.conn.get_all(key).await
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.conn.get_field(key, field).await
    }

    async fn set_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.conn.exec(&set_fields_pipeline(key, fields, ttl_secs)).await
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        self.conn.delete_key(key).await
    }

    async fn scan_keys(&self, pattern: &str, count: usize) -> Result<Vec<String>, StoreError> {
        self.conn.scan(pattern, count, Some("hash")).await
    }

    async fn range_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        range_by_score_cmd(key, min, max, offset, limit)
            .query_async(&mut self.conn.acquire())
            .await
            .map_err(store_error)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.conn.remove_member(key, member).await
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        self.conn.publish(channel, message).await
    }
}
