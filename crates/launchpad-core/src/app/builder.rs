//! LaunchpadBuilder - ストア・チャンネル・runnable のワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use super::dispatcher::Dispatcher;
use super::launchpad::Launchpad;
use crate::domain::RegistryError;
use crate::ports::{ErrorReporter, HashStore, MessageChannel, Runnable, RunnableSource};
use crate::store::{DEFAULT_TASKS_HASH, TaskStore};
use crate::typed::{Handler, RunnableRegistry, Task};

/// LaunchpadBuilder は Launchpad を構築
///
/// # 使用例
/// ```ignore
/// let launchpad = LaunchpadBuilder::new()
///     .store(Arc::new(RedisHashStore::new(url).await?))
///     .channel(Arc::new(RedisChannel::new(url).await?))
///     .load_from(&BuiltinRunnables)?
///     .expect_runnables(&["audio"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - store / channel が未設定なら BuildError
/// - expect_runnables() で期待される名前を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
pub struct LaunchpadBuilder {
    store: Option<Arc<dyn HashStore>>,
    tasks_hash: String,
    channel: Option<Arc<dyn MessageChannel>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    registry: RunnableRegistry,
    expected: Option<Vec<String>>,
}

/// BuildError はワイヤリング時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task store configured")]
    MissingStore,

    #[error("no message channel configured")]
    MissingChannel,

    #[error("Missing runnables: {0:?}. These runnables were expected but not registered.")]
    MissingRunnables(Vec<String>),
}

impl LaunchpadBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            tasks_hash: DEFAULT_TASKS_HASH.to_string(),
            channel: None,
            reporter: None,
            registry: RunnableRegistry::new(),
            expected: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn HashStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// タスクを保存するハッシュ名（既定: `launchpad:tasks`）
    pub fn tasks_hash(mut self, hash: impl Into<String>) -> Self {
        self.tasks_hash = hash.into();
        self
    }

    pub fn channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn runnable(self, runnable: Arc<dyn Runnable>) -> Self {
        self.registry.register(runnable);
        self
    }

    /// Handler を `T::TYPE` で登録
    pub fn register<T: Task, H: Handler<T> + 'static>(self, handler: H) -> Self {
        self.registry.register_typed::<T, H>(handler);
        self
    }

    pub fn load_from(self, source: &dyn RunnableSource) -> Result<Self, RegistryError> {
        self.registry.load_from(source)?;
        Ok(self)
    }

    /// 期待される runnable 名のリストを設定
    pub fn expect_runnables(mut self, names: &[&str]) -> Self {
        self.expected = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<Launchpad, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let channel = self.channel.ok_or(BuildError::MissingChannel)?;

        if let Some(expected) = &self.expected {
            let registered = self.registry.names();
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !registered.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingRunnables(missing));
            }
        }

        let mut dispatcher = Dispatcher::new(
            TaskStore::with_hash(store, self.tasks_hash),
            Arc::new(self.registry),
            channel,
        );
        if let Some(reporter) = self.reporter {
            dispatcher = dispatcher.with_reporter(reporter);
        }
        Ok(Launchpad::new(dispatcher))
    }
}

impl Default for LaunchpadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
