//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: config validation and expected workers

use std::sync::Arc;

use crate::app::config::StatusConfig;
use crate::app::hooks::{Submission, SubmissionHook};
use crate::app::runtime::{JobRegistry, RegistryError, Runtime, StatusJob};
use crate::app::storage::StatusStorage;
use crate::app::tracker::StatusTracker;
use crate::domain::{Jid, StatusError};
use crate::ports::{Clock, IdGenerator, KeyValueStore, SystemClock, UlidGenerator};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(store)
///     .config(StatusConfig::load("jobstat.toml")?)
///     .register(Arc::new(Export))?
///     .expect_workers(&["Export"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_workers() で期待される worker 名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: StatusConfig,
    registry: JobRegistry,
    expected_workers: Option<Vec<String>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing workers: {0:?}. These workers were expected but not registered.")]
    MissingWorkers(Vec<String>),

    #[error(transparent)]
    Config(#[from] StatusError),
}

impl AppBuilder {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ids: None,
            config: StatusConfig::default(),
            registry: JobRegistry::new(),
            expected_workers: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to ULIDs stamped by the builder's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: StatusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register(mut self, job: Arc<dyn StatusJob>) -> Result<Self, RegistryError> {
        self.registry.register(job)?;
        Ok(self)
    }

    pub fn expect_workers(mut self, workers: &[&str]) -> Self {
        self.expected_workers = Some(workers.iter().map(|w| w.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_workers {
            let registered = self.registry.registered_names();
            let missing: Vec<String> = expected
                .iter()
                .filter(|w| !registered.contains(w))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingWorkers(missing));
            }
        }

        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(self.clock.clone())),
        };
        let storage = StatusStorage::new(self.store, self.clock, Arc::new(self.config));

        Ok(App {
            tracker: StatusTracker::new(storage.clone()),
            submitter: SubmissionHook::new(storage.clone(), ids),
            runtime: Runtime::new(Arc::new(self.registry), storage),
        })
    }
}

/// App はアプリケーションのランタイム
///
/// - `submitter`: client-side enqueue hook
/// - `runtime`: worker-side execution
/// - `tracker`: read and operator API
pub struct App {
    pub tracker: StatusTracker,
    pub submitter: SubmissionHook,
    pub runtime: Runtime,
}

impl App {
    pub async fn enqueue(&self, submission: Submission) -> Result<Jid, StatusError> {
        self.submitter.on_enqueue(submission).await
    }
}
