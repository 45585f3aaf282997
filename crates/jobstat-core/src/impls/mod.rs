//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStore**: 開発用・テスト用の KeyValueStore
//! - **redis**: LegacyRedisStore / ModernRedisStore と起動時 probe (`redis::connect`)

pub mod memory;
pub mod redis;

// 主要な型を再エクスポート
pub use self::memory::{InMemoryStore, Published};
