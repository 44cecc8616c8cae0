//! InMemoryHashStore - 開発・テスト用のハッシュストア

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::StoreError;
use crate::ports::HashStore;

/// InMemoryHashStore はプロセス内の HashMap でハッシュを保持する
///
/// # 実装詳細
/// - HashMap<hash 名, HashMap<field, value>>
/// - 各操作はロック内で完結（ロックを跨いで await しない）
/// - Clone すると同じ中身を共有する
#[derive(Debug, Clone, Default)]
pub struct InMemoryHashStore {
    hashes: Arc<Mutex<HashMap<String, HashMap<String, String>>>>,
}

impl InMemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HashStore for InMemoryHashStore {
    async fn set_field(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.hashes
            .lock()
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .hashes
            .lock()
            .get(hash)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.hashes.lock().get(hash).cloned().unwrap_or_default())
    }

    async fn delete_field(&self, hash: &str, field: &str) -> Result<bool, StoreError> {
        let mut hashes = self.hashes.lock();
        let Some(h) = hashes.get_mut(hash) else {
            return Ok(false);
        };
        let existed = h.remove(field).is_some();
        // Redis と同じく、空になったハッシュは消す
        if h.is_empty() {
            hashes.remove(hash);
        }
        Ok(existed)
    }

    async fn keys(&self, hash: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .hashes
            .lock()
            .get(hash)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default())
    }
}
