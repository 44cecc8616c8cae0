//! RunnableRegistry - Runnable の登録と lookup
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - RwLock による実行中の load / unload
//! - Arc による共有所有権（lookup 結果はロックを離れて実行できる）
//!
//! # 同名登録
//! 後から登録したものが勝ちます（上書き）。`register` は置き換えた
//! runnable を返すので、呼び出し側で検知できます。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::handler::{Handler, TypedRunnable};
use super::task::Task;
use crate::domain::RegistryError;
use crate::ports::{Runnable, RunnableSource};

/// RunnableRegistry は name → Runnable の表
///
/// # 使用例
/// ```ignore
/// let registry = RunnableRegistry::new();
/// registry.register_typed::<AudioTask, _>(AudioHandler);
/// registry.load_from(&BuiltinRunnables)?;
///
/// let runnable = registry.lookup("audio");
/// ```
///
/// 複数の dispatch から同時に参照されます。ロックは lookup の間だけ保持し、
/// 実行中は保持しません。
#[derive(Default)]
pub struct RunnableRegistry {
    runnables: RwLock<HashMap<String, Arc<dyn Runnable>>>,
}

impl RunnableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// runnable を名前で登録（同名は上書き）
    pub fn register(&self, runnable: Arc<dyn Runnable>) -> Option<Arc<dyn Runnable>> {
        let name = runnable.name().to_string();
        let previous = self.runnables.write().insert(name.clone(), runnable);
        if previous.is_some() {
            tracing::debug!(runnable = %name, "runnable replaced");
        }
        previous
    }

    /// Handler<T> を `T::TYPE` の名前で登録
    pub fn register_typed<T: Task, H: Handler<T> + 'static>(
        &self,
        handler: H,
    ) -> Option<Arc<dyn Runnable>> {
        self.register(Arc::new(TypedRunnable::<T, H>::new(handler)))
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Runnable>> {
        self.runnables.read().get(name).cloned()
    }

    /// source の runnable を一括登録し、登録数を返す
    ///
    /// source の読み込みに失敗した場合は何も登録しません（既存の登録はそのまま）。
    pub fn load_from(&self, source: &dyn RunnableSource) -> Result<usize, RegistryError> {
        let loaded = source.load()?;
        let count = loaded.len();
        let mut runnables = self.runnables.write();
        for runnable in loaded {
            runnables.insert(runnable.name().to_string(), runnable);
        }
        tracing::info!(source = source.source_name(), count, "runnables loaded");
        Ok(count)
    }

    /// 全 runnable を登録解除
    pub fn clear(&self) {
        self.runnables.write().clear();
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.runnables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.runnables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runnables.read().is_empty()
    }
}
