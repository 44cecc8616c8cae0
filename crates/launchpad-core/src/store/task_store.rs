//! TaskStore - HashStore 上の TaskRecord 永続化
//!
//! HashStore は不透明な文字列しか扱わない dumb KV です。
//! TaskStore が TaskRecord ⇔ JSON の変換を受け持ちます。
//!
//! # 学習ポイント
//! - 「存在しない」（`Ok(None)`）とデコード失敗（`Err(Codec)`）を混同しない
//! - DeleteTasks は snapshot → 1 件ずつ削除（グローバルロックなし）

use std::sync::Arc;

use futures::future::try_join_all;

use crate::domain::{StoreError, StoredTask, TaskKey, TaskRecord};
use crate::ports::HashStore;

pub const DEFAULT_TASKS_HASH: &str = "launchpad:tasks";

/// TaskStore はタスクを 1 つのハッシュ（key → JSON）に保存する
///
/// # 使用例
/// ```ignore
/// let store = TaskStore::new(Arc::new(InMemoryHashStore::new()));
/// store.add_task(&TaskKey::new("k1"), &TaskRecord::of_type("test")).await?;
/// let task = store.get_task(&TaskKey::new("k1")).await?;
/// ```
#[derive(Clone)]
pub struct TaskStore {
    backend: Arc<dyn HashStore>,
    hash: String,
}

impl TaskStore {
    pub fn new(backend: Arc<dyn HashStore>) -> Self {
        Self::with_hash(backend, DEFAULT_TASKS_HASH)
    }

    /// ハッシュ名を指定して作成（環境・テストの分離用）
    pub fn with_hash(backend: Arc<dyn HashStore>, hash: impl Into<String>) -> Self {
        Self {
            backend,
            hash: hash.into(),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// record 全体を key に書き込む（無条件上書き）
    pub async fn add_task(&self, key: &TaskKey, record: &TaskRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record).map_err(|source| StoreError::Codec {
            key: key.to_string(),
            source,
        })?;
        self.backend.set_field(&self.hash, key.as_str(), &raw).await
    }

    pub async fn get_task(&self, key: &TaskKey) -> Result<Option<TaskRecord>, StoreError> {
        let Some(raw) = self.backend.get_field(&self.hash, key.as_str()).await? else {
            return Ok(None);
        };
        decode(key.as_str(), &raw).map(Some)
    }

    /// 全タスクを返す（順序は不定）
    ///
    /// 1 件でもデコードできなければエラーにします。
    pub async fn get_tasks(&self) -> Result<Vec<StoredTask>, StoreError> {
        let raw = self.backend.get_all(&self.hash).await?;
        raw.into_iter()
            .map(|(key, value)| {
                let record = decode(&key, &value)?;
                Ok(StoredTask {
                    key: TaskKey::new(key),
                    record,
                })
            })
            .collect()
    }

    pub async fn delete_task(&self, key: &TaskKey) -> Result<(), StoreError> {
        self.backend.delete_field(&self.hash, key.as_str()).await?;
        Ok(())
    }

    /// その時点のキー一覧を取って 1 件ずつ削除
    ///
    /// 並行して追加されたタスクは消えずに残ることがある（許容）。
    pub async fn delete_tasks(&self) -> Result<usize, StoreError> {
        let keys = self.backend.keys(&self.hash).await?;
        let removed = try_join_all(
            keys.iter()
                .map(|key| self.backend.delete_field(&self.hash, key)),
        )
        .await?;
        Ok(removed.into_iter().filter(|existed| *existed).count())
    }
}

fn decode(key: &str, raw: &str) -> Result<TaskRecord, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Params;
    use crate::impls::InMemoryHashStore;
    use serde_json::json;

    fn store() -> (TaskStore, InMemoryHashStore) {
        let backend = InMemoryHashStore::new();
        (TaskStore::new(Arc::new(backend.clone())), backend)
    }

    fn fixture() -> TaskRecord {
        let mut params = Params::new();
        params.insert("src".into(), json!("src"));
        params.insert("dest".into(), json!("dest"));
        TaskRecord::new("type", params)
    }

    #[tokio::test]
    async fn add_task_writes_json_to_hash() {
        let (store, backend) = store();
        let key = TaskKey::new("k1");
        store.add_task(&key, &fixture()).await.unwrap();

        let raw = backend
            .get_field(DEFAULT_TASKS_HASH, "k1")
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["type"], "type");
        assert_eq!(json["params"], json!({"src": "src", "dest": "dest"}));
    }

    #[tokio::test]
    async fn get_task_returns_what_was_stored() {
        let (store, _) = store();
        let key = TaskKey::new("k1");
        let task = fixture().completed();
        store.add_task(&key, &task).await.unwrap();

        assert_eq!(store.get_task(&key).await.unwrap(), Some(task));
    }

    #[tokio::test]
    async fn get_task_absent_is_none() {
        let (store, _) = store();
        assert_eq!(store.get_task(&TaskKey::new("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_task_undecodable_is_codec_error() {
        let (store, backend) = store();
        backend
            .set_field(DEFAULT_TASKS_HASH, "bad", "{not json")
            .await
            .unwrap();

        let err = store.get_task(&TaskKey::new("bad")).await.unwrap_err();
        assert!(matches!(err, StoreError::Codec { key, .. } if key == "bad"));
    }

    #[tokio::test]
    async fn get_tasks_returns_every_record() {
        let (store, _) = store();
        for i in 0..5 {
            store
                .add_task(&TaskKey::new(format!("k{i}")), &fixture())
                .await
                .unwrap();
        }

        let mut tasks = store.get_tasks().await.unwrap();
        tasks.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(tasks.len(), 5);
        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(task.key, TaskKey::new(format!("k{i}")));
            assert_eq!(task.record, fixture());
        }
    }

    #[tokio::test]
    async fn delete_task_then_get_is_none() {
        let (store, backend) = store();
        let key = TaskKey::new("k1");
        store.add_task(&key, &fixture()).await.unwrap();
        store.delete_task(&key).await.unwrap();

        assert_eq!(store.get_task(&key).await.unwrap(), None);
        assert!(backend.keys(DEFAULT_TASKS_HASH).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_tasks_empties_the_hash() {
        let (store, _) = store();
        for i in 0..3 {
            store
                .add_task(&TaskKey::new(format!("k{i}")), &fixture())
                .await
                .unwrap();
        }

        assert_eq!(store.delete_tasks().await.unwrap(), 3);
        assert!(store.get_tasks().await.unwrap().is_empty());
        // 空でも成功する
        assert_eq!(store.delete_tasks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hash_name_isolates_stores() {
        let backend: Arc<dyn HashStore> = Arc::new(InMemoryHashStore::new());
        let a = TaskStore::with_hash(backend.clone(), "launchpad:tasks:test");
        let b = TaskStore::new(backend);
        a.add_task(&TaskKey::new("k"), &fixture()).await.unwrap();

        assert!(b.get_tasks().await.unwrap().is_empty());
        assert_eq!(a.hash(), "launchpad:tasks:test");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn delete_tasks_alongside_add_task_stays_consistent() {
        let (store, _) = store();

        let adders: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .add_task(&TaskKey::new(format!("k{i}")), &fixture())
                        .await
                })
            })
            .collect();
        let deleters: Vec<_> = (0..5)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.delete_tasks().await })
            })
            .collect();

        for adder in adders {
            adder.await.unwrap().unwrap();
        }
        for deleter in deleters {
            deleter.await.unwrap().unwrap();
        }

        // 残ったものは全て完全な record として読める
        for task in store.get_tasks().await.unwrap() {
            assert_eq!(task.record, fixture());
        }
        store.delete_tasks().await.unwrap();
        assert!(store.get_tasks().await.unwrap().is_empty());
    }
}
