//! Job identifiers.
//!
//! A `Jid` is opaque: the host job system may hand us any string it already
//! uses as a job id, or we generate one from a ULID (see `ports::IdGenerator`).
//!
//! ## ULID の特性
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **分散生成可能**: 調整なしで複数ノードで生成できる

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one tracked job instance.
///
/// Immutable once assigned. Used as the suffix of the status record key, so
/// two live jobs must never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Lowercase ULID text, 26 chars.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Jid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Jid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Jid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
