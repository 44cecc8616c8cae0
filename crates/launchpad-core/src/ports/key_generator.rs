//! KeyGenerator port - producer 向けの TaskKey 生成
//!
//! キーは不透明な文字列なので、producer は任意の文字列を使えます。
//! ここでは衝突しにくい既定の生成方法（ULID）を提供します。
//!
//! # 実装
//! - **UlidKeyGenerator**: ULID ベース

use crate::domain::TaskKey;
use crate::ports::Clock;
use ulid::Ulid;

/// KeyGenerator は分散環境で使える TaskKey を生成
///
/// # ULID の特性
/// - 時刻でソート可能
/// - 調整なしで複数ノードから生成可能
pub trait KeyGenerator: Send + Sync {
    fn generate_key(&self) -> TaskKey;
}

/// UlidKeyGenerator は Clock の時刻 + 乱数で ULID を作る
///
/// FixedClock を渡すと timestamp 部分が固定されます。
pub struct UlidKeyGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidKeyGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> KeyGenerator for UlidKeyGenerator<C> {
    fn generate_key(&self) -> TaskKey {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskKey::new(ulid.to_string())
    }
}
