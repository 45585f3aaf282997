//! StatusStorage - in-store representation of status records.
//!
//! Owns key naming, TTL application, the atomic multi-field write, deletion
//! and the schedule-index purge. Every other component goes through here.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::app::config::{StatusConfig, check_expiration};
use crate::domain::{FieldMap, Jid, StatusError, fields};
use crate::ports::{Clock, KeyValueStore, ScoreBound};

/// One `(field, value)` pair to write.
pub type FieldWrite = (String, String);

pub fn set(name: &str, value: impl ToString) -> FieldWrite {
    (name.to_string(), value.to_string())
}

#[derive(Clone)]
pub struct StatusStorage {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: Arc<StatusConfig>,
}

impl StatusStorage {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: Arc<StatusConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// `{prefix}:{jid}`
    pub fn key(&self, jid: &Jid) -> String {
        format!("{}:{}", self.config.key_prefix, jid)
    }

    pub fn scan_pattern(&self) -> String {
        format!("{}:*", self.config.key_prefix)
    }

    /// Inverse of `key`. Jids may themselves contain `:`.
    pub fn jid_from_key(&self, key: &str) -> Option<Jid> {
        key.strip_prefix(self.config.key_prefix.as_str())?
            .strip_prefix(':')
            .filter(|jid| !jid.is_empty())
            .map(Jid::from)
    }

    /// Merge `updates` into the record, stamp `updated_at` and restart the
    /// TTL countdown (`ttl_secs`, or the configured default). An out-of-range
    /// TTL is a config error and nothing is written.
    ///
    /// The jid is then published on the updates channel; a failed publish is
    /// logged and does not fail the write.
    pub async fn write(
        &self,
        jid: &Jid,
        updates: Vec<FieldWrite>,
        ttl_secs: Option<u64>,
    ) -> Result<(), StatusError> {
        let key = self.key(jid);
        let ttl = ttl_secs.unwrap_or(self.config.expiration_secs);
        check_expiration(ttl)?;

        let mut updates = updates;
        updates.push(set(fields::UPDATED_AT, self.clock.unix_now()));

        self.store.set_fields(&key, &updates, ttl).await?;
        debug!(jid = %jid, fields = updates.len(), ttl, "status written");

        if let Some(channel) = self.config.updates_channel.as_deref().filter(|c| !c.is_empty())
            && let Err(e) = self.store.publish(channel, jid.as_str()).await
        {
            warn!(jid = %jid, channel, error = %e, "status update notification failed");
        }
        Ok(())
    }

    pub async fn read_field(&self, jid: &Jid, name: &str) -> Result<Option<String>, StatusError> {
        Ok(self.store.get_field(&self.key(jid), name).await?)
    }

    /// Raw fields; empty when absent or expired.
    pub async fn read_all(&self, jid: &Jid) -> Result<FieldMap, StatusError> {
        Ok(self.store.get_all(&self.key(jid)).await?)
    }

    /// Unconditional, idempotent removal. Returns whether a record existed.
    pub async fn delete(&self, jid: &Jid) -> Result<bool, StatusError> {
        let removed = self.store.delete_key(&self.key(jid)).await?;
        debug!(jid = %jid, removed, "status deleted");
        Ok(removed)
    }

    /// Every jid with a key under the prefix. Records may expire between the
    /// scan and the read that follows it.
    pub async fn scan_jids(&self) -> Result<Vec<Jid>, StatusError> {
        let keys = self
            .store
            .scan_keys(&self.scan_pattern(), self.config.scan_count)
            .await?;

        let mut seen = HashSet::new();
        Ok(keys
            .iter()
            .filter_map(|key| self.jid_from_key(key))
            .filter(|jid| seen.insert(jid.clone()))
            .collect())
    }

    /// Remove the job from the external schedule index.
    ///
    /// Members are the scheduler's JSON payloads; the one whose `"jid"`
    /// matches is removed. With `scheduled_at` the scan is narrowed to that
    /// exact score, otherwise the whole index is paged through.
    pub async fn unschedule(
        &self,
        jid: &Jid,
        scheduled_at: Option<f64>,
    ) -> Result<bool, StatusError> {
        let (min, max) = match scheduled_at {
            Some(at) => (ScoreBound::At(at), ScoreBound::At(at)),
            None => (ScoreBound::NegInf, ScoreBound::PosInf),
        };
        let schedule_key = self.config.schedule_key.as_str();
        let batch = self.config.schedule_batch;
        let mut offset = 0;

        loop {
            let members = self
                .store
                .range_by_score(schedule_key, min, max, offset, batch)
                .await?;
            if members.is_empty() {
                return Ok(false);
            }
            if let Some(member) = members.iter().find(|m| member_has_jid(m, jid)) {
                let removed = self.store.remove_member(schedule_key, member).await?;
                debug!(jid = %jid, removed, "job removed from schedule");
                return Ok(removed);
            }
            offset += batch;
        }
    }
}

fn member_has_jid(member: &str, jid: &Jid) -> bool {
    serde_json::from_str::<serde_json::Value>(member)
        .ok()
        .and_then(|payload| {
            payload
                .get(fields::JID)
                .and_then(|v| v.as_str())
                .map(|found| found == jid.as_str())
        })
        .unwrap_or(false)
}
