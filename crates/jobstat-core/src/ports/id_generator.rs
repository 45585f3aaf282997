//! IdGenerator port - ID 生成の抽象化
//!
//! The submission path calls this only when the host job system did not
//! already assign a jid.
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::Jid;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はジョブ ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_jid(&self) -> Jid;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock を使うと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_jid(&self) -> Jid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        Jid::from_ulid(ulid)
    }
}
