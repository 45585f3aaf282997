//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **StatusStorage**: key naming, TTL, atomic writes, schedule purge
//! - **SubmissionHook / ExecutionHooks**: state transitions as record writes
//! - **ProgressReporter**: in-job progress API and stop checkpoint
//! - **Runtime**: job registry and one execution attempt
//! - **StatusTracker**: read and operator API
//! - **ListingAggregator**: filter, sort and paginate all live records

pub mod builder;
pub mod config;
pub mod hooks;
pub mod listing;
pub mod progress;
pub mod runtime;
pub mod storage;
pub mod tracker;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::StatusConfig;
pub use self::hooks::{ExecutionHooks, Outcome, Submission, SubmissionHook};
pub use self::listing::{
    EnrichedStatus, JobListing, ListQuery, ListingAggregator, PageSize, SortColumn, SortDir,
};
pub use self::progress::ProgressReporter;
pub use self::runtime::{JobRegistry, RegistryError, Runtime, RuntimeError, StatusJob};
pub use self::storage::StatusStorage;
pub use self::tracker::StatusTracker;
