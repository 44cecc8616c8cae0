//! Launchpad - ライフサイクル制御（start / subscribe / stop）
//!
//! # 学習ポイント
//! - watch channel による listener の停止通知
//! - `select!` で受信と停止を競合させる
//! - stop() は listener の終了を await してから戻る（以後 dispatch は起きない）

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::dispatcher::Dispatcher;
use super::recovery::RecalculateSummary;
use crate::domain::{ChannelError, Message, StoreError, TaskKey, TaskRecord};
use crate::store::TaskStore;
use crate::typed::RunnableRegistry;

/// 起動中の listener
struct Listener {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// producer 側 `submit` の失敗
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("failed to encode run message: {0}")]
    Encode(#[from] crate::domain::MessageError),
}

/// Launchpad は Dispatcher を MessageChannel の受信ストリームにつなぐ
///
/// # 使用例
/// ```ignore
/// let launchpad = LaunchpadBuilder::new()
///     .store(Arc::new(InMemoryHashStore::new()))
///     .channel(Arc::new(broker.connect()))
///     .runnable(my_runnable)
///     .build()?;
/// launchpad.start().await;
/// launchpad.subscribe("launchpad").await?;
/// // ...
/// launchpad.stop().await?;
/// ```
pub struct Launchpad {
    dispatcher: Arc<Dispatcher>,
    channels: Mutex<BTreeSet<String>>,
    listener: tokio::sync::Mutex<Option<Listener>>,
}

impl Launchpad {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            channels: Mutex::new(BTreeSet::new()),
            listener: tokio::sync::Mutex::new(None),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn store(&self) -> &TaskStore {
        self.dispatcher.store()
    }

    pub fn registry(&self) -> &Arc<RunnableRegistry> {
        self.dispatcher.registry()
    }

    /// 受信ハンドラを取り付ける
    ///
    /// 既に取り付け済みなら何もせず `false` を返します（ハンドラは重複しない）。
    pub async fn start(&self) -> bool {
        let mut listener = self.listener.lock().await;
        if listener.as_ref().is_some_and(|l| !l.join.is_finished()) {
            return false;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(listen(Arc::clone(&self.dispatcher), shutdown_rx));
        *listener = Some(Listener { shutdown_tx, join });
        tracing::info!("launchpad started");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.join.is_finished())
    }

    pub async fn subscribe(&self, channel: &str) -> Result<(), ChannelError> {
        self.dispatcher.channel().subscribe(channel).await?;
        self.channels.lock().insert(channel.to_string());
        tracing::info!(channel, "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&self, channel: &str) -> Result<(), ChannelError> {
        self.dispatcher.channel().unsubscribe(channel).await?;
        self.channels.lock().remove(channel);
        tracing::info!(channel, "unsubscribed");
        Ok(())
    }

    /// 購読中のチャンネル（名前順）
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().iter().cloned().collect()
    }

    /// 全チャンネルを購読解除してから受信ハンドラを外す
    ///
    /// 受信済みで未処理のメッセージは捨てます。実行中の runnable は中断しません。
    /// 購読解除に失敗したチャンネルがあってもハンドラは必ず外し、最初のエラーを返します。
    pub async fn stop(&self) -> Result<(), ChannelError> {
        let mut first_err = None;
        for channel in self.channels() {
            if let Err(err) = self.unsubscribe(&channel).await {
                tracing::warn!(%channel, error = %err, "unsubscribe failed during stop");
                first_err.get_or_insert(err);
            }
        }

        if let Some(Listener { shutdown_tx, join }) = self.listener.lock().await.take() {
            // receiver が既に終わっていても構わない
            let _ = shutdown_tx.send(true);
            if let Err(err) = join.await {
                tracing::warn!(error = %err, "listener task ended abnormally");
            }
            tracing::info!("launchpad stopped");
        }

        // 購読解除前に届いて未読のまま残った分は次の start() に持ち越さない
        let discarded = self.dispatcher.channel().discard_pending().await;
        if discarded > 0 {
            tracing::debug!(discarded, "dropped pending messages on stop");
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// producer 側: タスクを保存して RUN を publish
    pub async fn submit(
        &self,
        channel: &str,
        key: &TaskKey,
        record: &TaskRecord,
    ) -> Result<(), SubmitError> {
        self.store().add_task(key, record).await?;
        let payload = Message::run(key.clone()).encode()?;
        self.dispatcher.channel().publish(channel, &payload).await?;
        Ok(())
    }

    pub async fn recalculate_tasks(&self, channel: &str) -> Result<RecalculateSummary, StoreError> {
        self.dispatcher.recalculate_tasks(channel).await
    }
}

async fn listen(dispatcher: Arc<Dispatcher>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let inbound = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                // sender が drop された場合も停止扱い
                if changed.is_err() {
                    break;
                }
                continue;
            }
            inbound = dispatcher.channel().recv() => inbound,
        };

        let Some(inbound) = inbound else {
            tracing::warn!("message channel closed, listener exiting");
            break;
        };

        // RUN は spawn されるのでここでは待たない
        dispatcher.handle(inbound);
    }
}
