//! jobstat-core
//!
//! Status tracking for background jobs: progress, timing and outcome of each
//! job kept in a shared key-value store with a sliding TTL, a cooperative
//! stop signal, and a listing view over every live record.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, record, progress, errors）
//! - **ports**: 抽象化レイヤー（KeyValueStore, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryStore, Redis legacy/modern adapters）
//! - **app**: アプリケーションロジック（builder, storage, hooks, progress, runtime, tracker, listing）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
