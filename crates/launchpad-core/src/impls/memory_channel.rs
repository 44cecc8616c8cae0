//! InMemoryBroker - 開発・テスト用の pub/sub
//!
//! # 学習ポイント
//! - 購読者ごとの unbounded mpsc で publish 順を保つ
//! - 購読集合を HashMap<channel, HashMap<subscriber_id, Sender>> で管理
//! - Drop で購読を自動解除

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::{ChannelError, Inbound};
use crate::ports::MessageChannel;

type SubscriberId = u64;

#[derive(Default)]
struct BrokerState {
    next_id: SubscriberId,
    channels: HashMap<String, HashMap<SubscriberId, mpsc::UnboundedSender<Inbound>>>,
}

/// InMemoryBroker はプロセス内の pub/sub ハブ
///
/// # 使用例
/// ```ignore
/// let broker = InMemoryBroker::new();
/// let worker = broker.connect();
/// worker.subscribe("launchpad").await?;
/// broker.publish("launchpad", r#"{"type":"task:run","task":"k1"}"#);
/// ```
///
/// # 配送
/// - publish 時点で購読しているコネクションにのみ届く（永続化なし）
/// - 同一チャンネル内は publish 順
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新しい購読コネクションを作成
    pub fn connect(&self) -> InMemoryChannel {
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            state.next_id
        };
        let (tx, rx) = mpsc::unbounded_channel();
        InMemoryChannel {
            id,
            broker: self.clone(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// 購読者全員に配送し、届いた数を返す
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        let mut state = self.state.lock();
        let Some(subscribers) = state.channels.get_mut(channel) else {
            return 0;
        };
        // 受信側が drop されたコネクションはここで掃除する
        subscribers.retain(|_, tx| tx.send(Inbound::new(channel, payload)).is_ok());
        let delivered = subscribers.len();
        if subscribers.is_empty() {
            state.channels.remove(channel);
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    fn add(&self, channel: &str, id: SubscriberId, tx: mpsc::UnboundedSender<Inbound>) {
        self.state
            .lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(id, tx);
    }

    fn remove(&self, channel: &str, id: SubscriberId) {
        let mut state = self.state.lock();
        if let Some(subscribers) = state.channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                state.channels.remove(channel);
            }
        }
    }

    fn remove_all(&self, id: SubscriberId) {
        let mut state = self.state.lock();
        state.channels.retain(|_, subscribers| {
            subscribers.remove(&id);
            !subscribers.is_empty()
        });
    }
}

/// InMemoryChannel は InMemoryBroker への 1 本の購読コネクション
pub struct InMemoryChannel {
    id: SubscriberId,
    broker: InMemoryBroker,
    tx: mpsc::UnboundedSender<Inbound>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
}

impl InMemoryChannel {
    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        self.broker.remove_all(self.id);
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ChannelError> {
        self.broker.publish(channel, payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), ChannelError> {
        // 同じ id で insert し直すだけなので二重購読でも重複しない
        self.broker.add(channel, self.id, self.tx.clone());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), ChannelError> {
        self.broker.remove(channel, self.id);
        Ok(())
    }

    async fn recv(&self) -> Option<Inbound> {
        self.rx.lock().await.recv().await
    }

    async fn discard_pending(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
