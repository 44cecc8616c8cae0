//! HashStore port - ハッシュ型 KV ストア（Redis または InMemory）
//!
//! TaskStore が使う最小の KV 契約です。値は不透明な文字列で、
//! シリアライズ・デシリアライズは上位（`store::TaskStore`）の責務です。
//!
//! # 実装
//! - **InMemoryHashStore**: 開発・テスト用
//! - **RedisHashStore**: 本番用（feature `redis`）

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::StoreError;

/// HashStore はハッシュ（field → value）を名前付きで保持する
///
/// # 設計原則
/// - 各操作は単一の atomic な store 操作（複数キーのトランザクションなし）
/// - ストア層のエラーは握りつぶさず返す
/// - 「存在しない」はエラーではなく `None`
#[async_trait]
pub trait HashStore: Send + Sync {
    /// field に値を書き込む（無条件上書き）
    async fn set_field(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError>;

    async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError>;

    /// field を削除。存在していたかどうかを返す
    async fn delete_field(&self, hash: &str, field: &str) -> Result<bool, StoreError>;

    async fn keys(&self, hash: &str) -> Result<Vec<String>, StoreError>;
}
