//! Dispatcher - RUN → execute → COMPLETE の状態機械
//!
//! # フロー（1 メッセージ分）
//! 1. Received: payload をデコード（失敗は Failed(malformed) として報告）
//! 2. Resolving: TaskStore::get_task(key)
//! 3. Executing: RunnableRegistry::lookup(type) → runnable.run(params)
//! 4. Completing: complete = true で書き戻し、同じチャンネルに COMPLETE を publish
//! 5. Done
//!
//! complete は runnable が戻ってから書くので、「実行済み」の印になります。
//! runnable が見つからない場合は complete を立てず、COMPLETE も出しません。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::domain::{
    Completion, DispatchError, DispatchState, Inbound, Message, RunnableError, TaskKey,
    TaskRecord,
};
use crate::ports::{ErrorReporter, MessageChannel, TracingReporter};
use crate::store::TaskStore;
use crate::typed::RunnableRegistry;

/// Dispatcher は TaskStore / Registry / MessageChannel を所有する dispatch エンジン
///
/// グローバル状態を持たないので、テストでは独立したインスタンスを
/// いくつでも作れます。
pub struct Dispatcher {
    store: TaskStore,
    registry: Arc<RunnableRegistry>,
    channel: Arc<dyn MessageChannel>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Dispatcher {
    pub fn new(
        store: TaskStore,
        registry: Arc<RunnableRegistry>,
        channel: Arc<dyn MessageChannel>,
    ) -> Self {
        Self {
            store,
            registry,
            channel,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<RunnableRegistry> {
        &self.registry
    }

    pub fn channel(&self) -> &Arc<dyn MessageChannel> {
        &self.channel
    }

    pub(crate) fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    /// 受信 1 件を処理する
    ///
    /// RUN は独立した tokio task として spawn し、すぐに戻ります
    /// （長い runnable が次の受信を止めない）。戻り値の JoinHandle は
    /// その dispatch の終端状態を返します。
    pub fn handle(self: &Arc<Self>, inbound: Inbound) -> Option<JoinHandle<DispatchState>> {
        let Inbound { channel, payload } = inbound;
        match Message::decode(&payload) {
            Err(err) => {
                self.reporter.report(&channel, None, &DispatchError::from(err));
                None
            }
            Ok(Message::Run { task }) => {
                tracing::debug!(%channel, %task, state = ?DispatchState::Received, "run received");
                let this = Arc::clone(self);
                Some(tokio::spawn(async move {
                    this.dispatch_and_report(&channel, &task).await
                }))
            }
            Ok(Message::Complete(completion)) => {
                // producer 向けの通知。worker 側では何もしない
                tracing::trace!(%channel, task = %completion.task, success = completion.success, "complete observed");
                None
            }
        }
    }

    /// dispatch して、失敗なら reporter に報告する
    pub async fn dispatch_and_report(&self, channel: &str, key: &TaskKey) -> DispatchState {
        match self.dispatch(channel, key).await {
            Ok(_) => DispatchState::Done,
            Err(err) => {
                self.reporter.report(channel, Some(key), &err);
                DispatchState::Failed(err.reason())
            }
        }
    }

    /// Resolving → Executing → Completing → Done
    pub async fn dispatch(&self, channel: &str, key: &TaskKey) -> Result<Completion, DispatchError> {
        tracing::debug!(channel, task = %key, state = ?DispatchState::Resolving);
        let record = self
            .store
            .get_task(key)
            .await?
            .ok_or_else(|| DispatchError::TaskNotFound(key.clone()))?;
        self.execute(channel, key, record).await
    }

    /// 解決済みの record を実行して完了を記録する
    pub(crate) async fn execute(
        &self,
        channel: &str,
        key: &TaskKey,
        record: TaskRecord,
    ) -> Result<Completion, DispatchError> {
        let runnable = self
            .registry
            .lookup(&record.task_type)
            .ok_or_else(|| DispatchError::RunnableNotFound(record.task_type.clone()))?;

        tracing::debug!(channel, task = %key, runnable = runnable.name(), state = ?DispatchState::Executing);
        // panic も runnable の失敗として COMPLETE に載せる
        let outcome = AssertUnwindSafe(async { runnable.run(record.params.clone()).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panicked(runnable.name(), &*payload)));

        tracing::debug!(channel, task = %key, success = outcome.is_ok(), state = ?DispatchState::Completing);
        self.store.add_task(key, &record.completed()).await?;

        let completion = Completion::from_outcome(key.clone(), outcome);
        self.announce(channel, completion.clone()).await?;
        tracing::debug!(channel, task = %key, state = ?DispatchState::Done);
        Ok(completion)
    }

    /// COMPLETE を publish
    pub(crate) async fn announce(
        &self,
        channel: &str,
        completion: Completion,
    ) -> Result<(), DispatchError> {
        let payload = Message::Complete(completion).encode()?;
        self.channel.publish(channel, &payload).await?;
        Ok(())
    }
}

fn panicked(name: &str, payload: &(dyn Any + Send)) -> RunnableError {
    let detail: &str = if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    };
    RunnableError::new(format!("runnable {name} panicked: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailReason, Params, RunnableError, StoreError};
    use crate::impls::{InMemoryBroker, InMemoryChannel, InMemoryHashStore, RecordingReporter};
    use crate::ports::HashStore;
    use crate::typed::FnRunnable;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::timeout;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        reporter: RecordingReporter,
        observer: InMemoryChannel,
    }

    fn harness_with(backend: Arc<dyn HashStore>) -> Harness {
        let broker = InMemoryBroker::new();
        let reporter = RecordingReporter::new();
        let registry = Arc::new(RunnableRegistry::new());
        registry.register(FnRunnable::arc("test", |_p: Params| async {
            Ok::<_, RunnableError>(json!("result"))
        }));
        registry.register(FnRunnable::arc("fail", |_p: Params| async {
            Err::<Value, _>(RunnableError::new("exit status 1"))
        }));
        registry.register(FnRunnable::arc("boom", |p: Params| async move {
            if p.is_empty() {
                panic!("exploded");
            }
            Ok::<_, RunnableError>(Value::Null)
        }));
        let dispatcher = Dispatcher::new(
            TaskStore::new(backend),
            registry,
            Arc::new(broker.connect()),
        )
        .with_reporter(Arc::new(reporter.clone()));
        Harness {
            dispatcher: Arc::new(dispatcher),
            reporter,
            observer: broker.connect(),
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(InMemoryHashStore::new()))
    }

    async fn next_complete(observer: &InMemoryChannel) -> Option<Completion> {
        loop {
            let inbound = timeout(Duration::from_millis(300), observer.recv())
                .await
                .ok()
                .flatten()?;
            if let Ok(Message::Complete(c)) = Message::decode(&inbound.payload) {
                return Some(c);
            }
        }
    }

    /// 常に失敗する HashStore
    struct DownStore;

    #[async_trait]
    impl HashStore for DownStore {
        async fn set_field(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::backend("connection refused"))
        }
        async fn get_field(&self, _: &str, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::backend("connection refused"))
        }
        async fn get_all(&self, _: &str) -> Result<HashMap<String, String>, StoreError> {
            Err(StoreError::backend("connection refused"))
        }
        async fn delete_field(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::backend("connection refused"))
        }
        async fn keys(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::backend("connection refused"))
        }
    }

    /// 読み出しはできるが書き込みだけ失敗する HashStore
    struct ReadOnlyStore(InMemoryHashStore);

    #[async_trait]
    impl HashStore for ReadOnlyStore {
        async fn set_field(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::backend("READONLY replica"))
        }
        async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
            self.0.get_field(hash, field).await
        }
        async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
            self.0.get_all(hash).await
        }
        async fn delete_field(&self, hash: &str, field: &str) -> Result<bool, StoreError> {
            self.0.delete_field(hash, field).await
        }
        async fn keys(&self, hash: &str) -> Result<Vec<String>, StoreError> {
            self.0.keys(hash).await
        }
    }

    #[tokio::test]
    async fn dispatch_runs_marks_complete_and_publishes() {
        let h = harness();
        h.observer.subscribe("launchpad").await.unwrap();
        let key = TaskKey::new("k1");
        h.dispatcher
            .store()
            .add_task(&key, &TaskRecord::of_type("test"))
            .await
            .unwrap();

        let completion = h.dispatcher.dispatch("launchpad", &key).await.unwrap();
        assert!(completion.success);
        assert_eq!(completion.result, json!("result"));

        let stored = h.dispatcher.store().get_task(&key).await.unwrap().unwrap();
        assert!(stored.complete);

        let published = next_complete(&h.observer).await.unwrap();
        assert_eq!(published, completion);
    }

    #[tokio::test]
    async fn runnable_error_is_a_normal_completion() {
        let h = harness();
        h.observer.subscribe("launchpad").await.unwrap();
        let key = TaskKey::new("k1");
        h.dispatcher
            .store()
            .add_task(&key, &TaskRecord::of_type("fail"))
            .await
            .unwrap();

        let completion = h.dispatcher.dispatch("launchpad", &key).await.unwrap();
        assert!(!completion.success);
        assert_eq!(completion.error.as_deref(), Some("exit status 1"));

        let stored = h.dispatcher.store().get_task(&key).await.unwrap().unwrap();
        assert!(stored.complete);
        assert!(!next_complete(&h.observer).await.unwrap().success);
        assert!(h.reporter.failures().is_empty());
    }

    #[tokio::test]
    async fn missing_runnable_leaves_task_incomplete() {
        let h = harness();
        h.observer.subscribe("launchpad").await.unwrap();
        let key = TaskKey::new("k1");
        h.dispatcher
            .store()
            .add_task(&key, &TaskRecord::of_type("nobody"))
            .await
            .unwrap();

        let state = h.dispatcher.dispatch_and_report("launchpad", &key).await;
        assert_eq!(state, DispatchState::Failed(FailReason::RunnableNotFound));

        let stored = h.dispatcher.store().get_task(&key).await.unwrap().unwrap();
        assert!(!stored.complete);
        assert!(next_complete(&h.observer).await.is_none());
        assert_eq!(h.reporter.reasons(), vec![FailReason::RunnableNotFound]);
    }

    #[tokio::test]
    async fn missing_task_is_reported() {
        let h = harness();
        let key = TaskKey::new("ghost");

        let state = h.dispatcher.dispatch_and_report("launchpad", &key).await;
        assert_eq!(state, DispatchState::Failed(FailReason::NotFound));

        let failures = h.reporter.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task, Some(key));
        assert_eq!(failures[0].channel, "launchpad");
    }

    #[tokio::test]
    async fn store_error_aborts_without_completion() {
        let h = harness_with(Arc::new(DownStore));
        h.observer.subscribe("launchpad").await.unwrap();

        let state = h
            .dispatcher
            .dispatch_and_report("launchpad", &TaskKey::new("k1"))
            .await;
        assert_eq!(state, DispatchState::Failed(FailReason::StoreError));
        assert!(next_complete(&h.observer).await.is_none());
    }

    #[tokio::test]
    async fn handle_reports_malformed_payloads() {
        let h = harness();
        assert!(h.dispatcher.handle(Inbound::new("launchpad", "{oops")).is_none());
        assert!(
            h.dispatcher
                .handle(Inbound::new("launchpad", r#"{"type":"task:launch","task":"k"}"#))
                .is_none()
        );
        assert_eq!(
            h.reporter.reasons(),
            vec![FailReason::Malformed, FailReason::Malformed]
        );
    }

    #[tokio::test]
    async fn handle_ignores_complete_messages() {
        let h = harness();
        h.observer.subscribe("launchpad").await.unwrap();
        let raw = Message::Complete(Completion::announce(TaskKey::new("k1")))
            .encode()
            .unwrap();

        assert!(h.dispatcher.handle(Inbound::new("launchpad", raw)).is_none());
        assert!(next_complete(&h.observer).await.is_none());
        assert!(h.reporter.failures().is_empty());
    }

    #[tokio::test]
    async fn handle_spawns_run_and_replies_on_same_channel() {
        let h = harness();
        h.observer.subscribe("other").await.unwrap();
        let key = TaskKey::new("k1");
        h.dispatcher
            .store()
            .add_task(&key, &TaskRecord::of_type("test"))
            .await
            .unwrap();

        let raw = Message::run(key.clone()).encode().unwrap();
        let join = h.dispatcher.handle(Inbound::new("other", raw)).unwrap();
        assert_eq!(join.await.unwrap(), DispatchState::Done);

        let completion = next_complete(&h.observer).await.unwrap();
        assert_eq!(completion.task, key);
    }

    #[tokio::test]
    async fn panicking_runnable_completes_with_failure() {
        let h = harness();
        h.observer.subscribe("launchpad").await.unwrap();
        let key = TaskKey::new("k1");
        h.dispatcher
            .store()
            .add_task(&key, &TaskRecord::of_type("boom"))
            .await
            .unwrap();

        let raw = Message::run(key.clone()).encode().unwrap();
        let join = h.dispatcher.handle(Inbound::new("launchpad", raw)).unwrap();
        assert_eq!(join.await.unwrap(), DispatchState::Done);

        let completion = next_complete(&h.observer).await.unwrap();
        assert_eq!(completion.task, key);
        assert!(!completion.success);
        assert!(completion.error.unwrap().contains("exploded"));
        assert_eq!(completion.result, Value::Null);

        let stored = h.dispatcher.store().get_task(&key).await.unwrap().unwrap();
        assert!(stored.complete);
    }

    #[tokio::test]
    async fn write_back_failure_publishes_nothing() {
        let inner = InMemoryHashStore::new();
        let key = TaskKey::new("k1");
        TaskStore::new(Arc::new(inner.clone()))
            .add_task(&key, &TaskRecord::of_type("test"))
            .await
            .unwrap();

        let h = harness_with(Arc::new(ReadOnlyStore(inner)));
        h.observer.subscribe("launchpad").await.unwrap();

        let state = h.dispatcher.dispatch_and_report("launchpad", &key).await;
        assert_eq!(state, DispatchState::Failed(FailReason::StoreError));
        assert!(next_complete(&h.observer).await.is_none());
        assert_eq!(h.reporter.reasons(), vec![FailReason::StoreError]);

        let stored = h.dispatcher.store().get_task(&key).await.unwrap().unwrap();
        assert!(!stored.complete);
    }

    #[tokio::test]
    async fn handle_reports_undecodable_bytes_as_malformed() {
        let h = harness();
        let payload = String::from_utf8_lossy(b"{\"type\":\"task:run\",\"task\":\xff}").into_owned();
        assert!(h.dispatcher.handle(Inbound::new("launchpad", payload)).is_none());
        assert_eq!(h.reporter.reasons(), vec![FailReason::Malformed]);
    }
}
