//! InMemoryStore - 開発用・テスト用の KeyValueStore
//!
//! # 学習ポイント
//! - Mutex で排他制御（await を跨いでロックしない）
//! - TTL は Clock から読んで lazy に期限切れ判定
//! - publish は tokio::sync::broadcast で購読者に配る

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;

use crate::domain::{FieldMap, StoreError};
use crate::ports::{Clock, KeyValueStore, ScoreBound};

#[derive(Debug, Clone)]
enum Value {
    Hash(FieldMap),
    /// (score, member), kept sorted by score then member.
    SortedSet(Vec<(f64, String)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// A published notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub channel: String,
    pub message: String,
}

/// In-process store with the same observable behavior as the Redis adapters.
///
/// # 実装詳細
/// - HashMap<String, Entry> を Mutex で保護
/// - 期限切れ entry は読み取り時に削除（Redis の passive expiry と同じ）
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    published: broadcast::Sender<Published>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (published, _) = broadcast::channel(256);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            published,
        }
    }

    /// Receive every later `publish`.
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.published.subscribe()
    }

    /// Add a member to a sorted set. The schedule index is written by the
    /// host scheduler; this exists so tests and demos can seed it.
    pub fn add_scheduled(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        let now = self.clock.now();
        purge_if_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::SortedSet(Vec::new()),
            expires_at: None,
        });
        let Value::SortedSet(members) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        members.retain(|(_, m)| m != member);
        members.push((score, member.to_string()));
        members.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(())
    }

    /// Seconds until `key` expires; `None` for absent or persistent keys.
    pub fn ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut entries = self.lock()?;
        let now = self.clock.now();
        purge_if_expired(&mut entries, key, now);
        Ok(entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| (at - now).num_seconds()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

fn purge_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: DateTime<Utc>) {
    let expired = entries
        .get(key)
        .and_then(|entry| entry.expires_at)
        .is_some_and(|at| at <= now);
    if expired {
        entries.remove(key);
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Command(format!(
        "WRONGTYPE operation against key {key} holding the wrong kind of value"
    ))
}

/// Glob match supporting `*` and `?`, the subset SCAN patterns use here.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    fn protocol(&self) -> &'static str {
        "in-memory"
    }

    async fn get_all(&self, key: &str) -> Result<FieldMap, StoreError> {
        let mut entries = self.lock()?;
        purge_if_expired(&mut entries, key, self.clock.now());
        match entries.get(key).map(|entry| &entry.value) {
            Some(Value::Hash(fields)) => Ok(fields.clone()),
            Some(Value::SortedSet(_)) => Err(wrong_type(key)),
            None => Ok(FieldMap::new()),
        }
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        purge_if_expired(&mut entries, key, self.clock.now());
        match entries.get(key).map(|entry| &entry.value) {
            Some(Value::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Value::SortedSet(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let expires_at = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| StoreError::Command(format!("invalid expire time: {ttl_secs}s")))?;

        let mut entries = self.lock()?;
        purge_if_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(FieldMap::new()),
            expires_at: None,
        });
        let Value::Hash(hash) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        for (name, value) in fields {
            hash.insert(name.clone(), value.clone());
        }
        entry.expires_at = Some(expires_at);
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        purge_if_expired(&mut entries, key, self.clock.now());
        Ok(entries.remove(key).is_some())
    }

    async fn scan_keys(&self, pattern: &str, _count: usize) -> Result<Vec<String>, StoreError> {
        let mut entries = self.lock()?;
        let now = self.clock.now();
        entries.retain(|_, entry| entry.expires_at.is_none_or(|at| at > now));
        Ok(entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn range_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let mut entries = self.lock()?;
        purge_if_expired(&mut entries, key, self.clock.now());
        match entries.get(key).map(|entry| &entry.value) {
            Some(Value::SortedSet(members)) => Ok(members
                .iter()
                .filter(|(score, _)| min.contains_lower(*score) && max.contains_upper(*score))
                .skip(offset)
                .take(limit)
                .map(|(_, member)| member.clone())
                .collect()),
            Some(Value::Hash(_)) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        purge_if_expired(&mut entries, key, self.clock.now());
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        let Value::SortedSet(members) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        let before = members.len();
        members.retain(|(_, m)| m != member);
        let removed = members.len() != before;
        if members.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        // 購読者がいなくてもエラーにしない（Redis の PUBLISH と同じ）
        let _ = self.published.send(Published {
            channel: channel.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}
