//! StatusConfig - process-wide defaults as an explicit value.
//!
//! Built-in defaults, optionally overridden from TOML. Nothing reads global
//! state; the config is handed to `AppBuilder` once at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::listing::SortColumn;
use crate::domain::StatusError;

/// Default time-to-live of a status record: 30 minutes.
pub const DEFAULT_EXPIRATION_SECS: u64 = 60 * 30;
pub const DEFAULT_PER_PAGE: usize = 25;

/// Largest TTL Redis accepts: it keeps expiry times in milliseconds.
pub const MAX_EXPIRATION_SECS: u64 = i64::MAX as u64 / 1000;

/// Reject a TTL no store can honor.
pub fn check_expiration(secs: u64) -> Result<(), StatusError> {
    if secs == 0 {
        return Err(StatusError::Config("expiration must be > 0".into()));
    }
    if secs > MAX_EXPIRATION_SECS {
        return Err(StatusError::Config(format!(
            "expiration must be <= {MAX_EXPIRATION_SECS}s, got {secs}s"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Sliding TTL applied on every write unless a worker overrides it.
    pub expiration_secs: u64,

    /// Namespace of status record keys: `{key_prefix}:{jid}`.
    pub key_prefix: String,

    /// Sorted set of not-yet-started jobs, owned by the host scheduler.
    pub schedule_key: String,

    /// Channel that receives the jid after each write; `None` disables it.
    pub updates_channel: Option<String>,

    /// Per-round-trip SCAN hint.
    pub scan_count: usize,

    /// Members fetched per schedule-index page while cancelling.
    pub schedule_batch: usize,

    pub default_per_page: usize,
    /// Page sizes a listing may ask for; others get `default_per_page`.
    /// Empty allows any size.
    pub per_page_options: Vec<usize>,

    /// Columns a listing may sort by; anything else falls back to `default_sort`.
    pub sortable_columns: Vec<SortColumn>,
    pub default_sort: SortColumn,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            expiration_secs: DEFAULT_EXPIRATION_SECS,
            key_prefix: "jobstat:status".to_string(),
            schedule_key: "schedule".to_string(),
            updates_channel: Some("status_updates".to_string()),
            scan_count: 100,
            schedule_batch: 100,
            default_per_page: DEFAULT_PER_PAGE,
            per_page_options: vec![25, 50, 100],
            sortable_columns: SortColumn::SORTABLE.to_vec(),
            default_sort: SortColumn::UpdatedAt,
        }
    }
}

impl StatusConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, StatusError> {
        let config: StatusConfig =
            toml::from_str(s).map_err(|e| StatusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StatusError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StatusError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), StatusError> {
        check_expiration(self.expiration_secs)?;
        if self.default_per_page == 0 {
            return Err(StatusError::Config("default_per_page must be > 0".into()));
        }
        if self.per_page_options.contains(&0) {
            return Err(StatusError::Config("per_page_options must not contain 0".into()));
        }
        if self.key_prefix.is_empty() {
            return Err(StatusError::Config("key_prefix must not be empty".into()));
        }
        if self.scan_count == 0 || self.schedule_batch == 0 {
            return Err(StatusError::Config(
                "scan_count and schedule_batch must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn is_sortable(&self, column: SortColumn) -> bool {
        self.sortable_columns.contains(&column)
    }

    pub fn allows_per_page(&self, size: usize) -> bool {
        size > 0 && (self.per_page_options.is_empty() || self.per_page_options.contains(&size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = StatusConfig::default();
        assert_eq!(config.expiration_secs, 1800);
        assert_eq!(config.default_per_page, 25);
        assert_eq!(config.per_page_options, vec![25, 50, 100]);
        assert_eq!(config.default_sort, SortColumn::UpdatedAt);
        assert!(config.is_sortable(SortColumn::Elapsed));
        assert!(!config.is_sortable(SortColumn::Eta));
        assert!(config.allows_per_page(50));
        assert!(!config.allows_per_page(7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_only_named_fields() {
        let config = StatusConfig::from_toml_str(
            r#"
            expiration_secs = 60
            key_prefix = "myapp:status"
            sortable_columns = ["status", "worker"]
            "#,
        )
        .unwrap();

        assert_eq!(config.expiration_secs, 60);
        assert_eq!(config.key_prefix, "myapp:status");
        assert_eq!(
            config.sortable_columns,
            vec![SortColumn::Status, SortColumn::Worker]
        );
        assert_eq!(config.default_per_page, 25);
        assert_eq!(config.updates_channel.as_deref(), Some("status_updates"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = StatusConfig::from_toml_str("expiration_secs = 0").unwrap_err();
        assert!(matches!(err, StatusError::Config(_)));

        let err = StatusConfig::from_toml_str("default_sort = \"nope\"").unwrap_err();
        assert!(matches!(err, StatusError::Config(_)));
    }

    #[test]
    fn empty_page_options_allow_any_size() {
        let config = StatusConfig::from_toml_str("per_page_options = []").unwrap();
        assert!(config.allows_per_page(7));
        assert!(!config.allows_per_page(0));

        let err = StatusConfig::from_toml_str("per_page_options = [0, 25]").unwrap_err();
        assert!(matches!(err, StatusError::Config(_)));
    }

    #[test]
    fn expiration_is_bounded() {
        let err = StatusConfig::from_toml_str("expiration_secs = 10000000000000000").unwrap_err();
        assert!(matches!(err, StatusError::Config(_)));

        let config = StatusConfig::from_toml_str(&format!("expiration_secs = {MAX_EXPIRATION_SECS}"));
        assert!(config.is_ok());
    }
}
