//! Recovery sweep - 保存済みタスクの再調整
//!
//! # フロー
//! 1. TaskStore::get_tasks() で全件取得
//! 2. complete 済み → COMPLETE を再通知（見逃した producer 向け）
//! 3. 未完了 → RUN と同じ Executing → Completing を再実行
//!
//! ベストエフォートです。1 件の失敗は報告して次に進みます。
//! ライブの dispatch と並行して何度実行しても構いません。

use futures::future::join_all;
use serde::Serialize;

use super::dispatcher::Dispatcher;
use crate::domain::{Completion, StoreError, StoredTask};

/// recalculate_tasks の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecalculateSummary {
    /// 再通知した complete 済みタスク
    pub completed: usize,
    /// 再実行を試みた未完了タスク
    pub rerun: usize,
    /// 再通知・再実行に失敗した件数（reporter に報告済み）
    pub failed: usize,
}

enum Swept {
    Announced,
    Rerun,
    Failed,
}

impl Dispatcher {
    /// 全タスクを一度だけ走査して再調整する
    ///
    /// ストア全体が読めない場合のみエラーを返します。
    pub async fn recalculate_tasks(&self, channel: &str) -> Result<RecalculateSummary, StoreError> {
        let tasks = self.store().get_tasks().await?;
        let results = join_all(tasks.into_iter().map(|task| self.sweep_one(channel, task))).await;

        let mut summary = RecalculateSummary::default();
        for swept in results {
            match swept {
                Swept::Announced => summary.completed += 1,
                Swept::Rerun => summary.rerun += 1,
                Swept::Failed => summary.failed += 1,
            }
        }
        tracing::info!(
            channel,
            completed = summary.completed,
            rerun = summary.rerun,
            failed = summary.failed,
            "tasks recalculated"
        );
        Ok(summary)
    }

    async fn sweep_one(&self, channel: &str, task: StoredTask) -> Swept {
        let StoredTask { key, record } = task;
        let result = if record.complete {
            self.announce(channel, Completion::announce(key.clone()))
                .await
                .map(|_| Swept::Announced)
        } else {
            self.execute(channel, &key, record).await.map(|_| Swept::Rerun)
        };
        result.unwrap_or_else(|err| {
            self.reporter().report(channel, Some(&key), &err);
            Swept::Failed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailReason, Message, Params, RunnableError, TaskKey, TaskRecord};
    use crate::impls::{InMemoryBroker, InMemoryChannel, InMemoryHashStore, RecordingReporter};
    use crate::ports::MessageChannel;
    use crate::store::TaskStore;
    use crate::typed::{FnRunnable, RunnableRegistry};
    use crate::app::Launchpad;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn drain_completions(observer: &InMemoryChannel) -> Vec<Completion> {
        let mut out = Vec::new();
        while let Ok(Some(inbound)) = timeout(Duration::from_millis(200), observer.recv()).await {
            if let Ok(Message::Complete(c)) = Message::decode(&inbound.payload) {
                out.push(c);
            }
        }
        out.sort_by(|a, b| a.task.cmp(&b.task));
        out
    }

    #[tokio::test]
    async fn announces_complete_and_reruns_pending() {
        let broker = InMemoryBroker::new();
        let observer = broker.connect();
        observer.subscribe("launchpad").await.unwrap();

        let reporter = RecordingReporter::new();
        let registry = Arc::new(RunnableRegistry::new());
        registry.register(FnRunnable::arc("test", |_p: Params| async {
            Ok::<_, RunnableError>(json!("again"))
        }));
        let dispatcher = Dispatcher::new(
            TaskStore::new(Arc::new(InMemoryHashStore::new())),
            registry,
            Arc::new(broker.connect()),
        )
        .with_reporter(Arc::new(reporter.clone()));

        let store = dispatcher.store();
        store
            .add_task(&TaskKey::new("a-done"), &TaskRecord::of_type("test").completed())
            .await
            .unwrap();
        store
            .add_task(&TaskKey::new("b-pending"), &TaskRecord::of_type("test"))
            .await
            .unwrap();
        store
            .add_task(&TaskKey::new("c-orphan"), &TaskRecord::of_type("gone"))
            .await
            .unwrap();

        let summary = dispatcher.recalculate_tasks("launchpad").await.unwrap();
        assert_eq!(
            summary,
            RecalculateSummary {
                completed: 1,
                rerun: 1,
                failed: 1
            }
        );

        let completions = drain_completions(&observer).await;
        assert_eq!(completions.len(), 2);
        assert_eq!(completions[0], Completion::announce(TaskKey::new("a-done")));
        assert_eq!(completions[1].task, TaskKey::new("b-pending"));
        assert_eq!(completions[1].result, json!("again"));

        let pending = store.get_task(&TaskKey::new("b-pending")).await.unwrap().unwrap();
        assert!(pending.complete);
        let orphan = store.get_task(&TaskKey::new("c-orphan")).await.unwrap().unwrap();
        assert!(!orphan.complete);
        assert_eq!(reporter.reasons(), vec![FailReason::RunnableNotFound]);
    }

    #[tokio::test]
    async fn second_sweep_only_announces() {
        let broker = InMemoryBroker::new();
        let registry = Arc::new(RunnableRegistry::new());
        registry.register(FnRunnable::arc("test", |_p: Params| async {
            Ok::<_, RunnableError>(json!(null))
        }));
        let dispatcher = Dispatcher::new(
            TaskStore::new(Arc::new(InMemoryHashStore::new())),
            registry,
            Arc::new(broker.connect()),
        );
        dispatcher
            .store()
            .add_task(&TaskKey::new("k"), &TaskRecord::of_type("test"))
            .await
            .unwrap();

        let first = dispatcher.recalculate_tasks("launchpad").await.unwrap();
        assert_eq!(first.rerun, 1);
        let second = dispatcher.recalculate_tasks("launchpad").await.unwrap();
        assert_eq!(second.completed, 1);
        assert_eq!(second.rerun, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sweep_runs_alongside_live_dispatch() {
        let broker = InMemoryBroker::new();
        let observer = broker.connect();
        observer.subscribe("launchpad").await.unwrap();

        let reporter = RecordingReporter::new();
        let registry = Arc::new(RunnableRegistry::new());
        registry.register(FnRunnable::arc("test", |_p: Params| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, RunnableError>(json!("ok"))
        }));
        let launchpad = Launchpad::new(
            Dispatcher::new(
                TaskStore::new(Arc::new(InMemoryHashStore::new())),
                registry,
                Arc::new(broker.connect()),
            )
            .with_reporter(Arc::new(reporter.clone())),
        );
        launchpad.start().await;
        launchpad.subscribe("launchpad").await.unwrap();

        let keys: Vec<TaskKey> = (0..10).map(|i| TaskKey::new(format!("k{i}"))).collect();
        let submit_all = async {
            for key in &keys {
                launchpad
                    .submit("launchpad", key, &TaskRecord::of_type("test"))
                    .await
                    .unwrap();
            }
        };
        let (_, summary) = tokio::join!(submit_all, launchpad.recalculate_tasks("launchpad"));
        let summary = summary.unwrap();
        assert_eq!(summary.failed, 0);

        let completions = drain_completions(&observer).await;
        let seen: BTreeSet<TaskKey> = completions
            .iter()
            .filter(|c| c.success)
            .map(|c| c.task.clone())
            .collect();
        assert_eq!(seen, keys.iter().cloned().collect());

        for key in &keys {
            let record = launchpad.store().get_task(key).await.unwrap().unwrap();
            assert!(record.complete);
        }
        assert!(reporter.failures().is_empty());
        launchpad.stop().await.unwrap();
    }
}
