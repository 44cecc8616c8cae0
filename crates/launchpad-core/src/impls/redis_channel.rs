//! RedisChannel - Redis pub/sub を使う本番用 MessageChannel
//!
//! Redis の購読モード接続では他のコマンドを打てないため、
//! publish 用の MultiplexedConnection と購読用の PubSub 接続を別に持ちます。
//! PubSub は sink（SUBSCRIBE / UNSUBSCRIBE）と stream（受信）に分割し、
//! 受信ループを止めずに購読集合を変更できるようにしています。

use ::redis::AsyncCommands;
use ::redis::aio::{MultiplexedConnection, PubSubSink, PubSubStream};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio::sync::Mutex;

use crate::domain::{ChannelError, Inbound};
use crate::ports::MessageChannel;

pub struct RedisChannel {
    publisher: MultiplexedConnection,
    sink: Mutex<PubSubSink>,
    stream: Mutex<PubSubStream>,
}

fn backend(context: &str, err: ::redis::RedisError) -> ChannelError {
    ChannelError::Backend {
        message: format!("{context}: {err}"),
        source: Some(Box::new(err)),
    }
}

/// UTF-8 でない payload も捨てずに渡し、デコード失敗として Dispatcher に報告させる
fn to_inbound(channel: &str, payload: &[u8]) -> Inbound {
    Inbound::new(channel, String::from_utf8_lossy(payload).into_owned())
}

impl RedisChannel {
    pub async fn new(url: &str) -> Result<Self, ChannelError> {
        let client =
            ::redis::Client::open(url).map_err(|e| backend("failed to create Redis client", e))?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| backend("failed to connect to Redis", e))?;
        let pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| backend("failed to open Redis pub/sub connection", e))?;
        let (sink, stream) = pubsub.split();
        Ok(Self {
            publisher,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl MessageChannel for RedisChannel {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ChannelError> {
        let _: i64 = self
            .publisher
            .clone()
            .publish(channel, payload)
            .await
            .map_err(|e| backend("PUBLISH failed", e))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), ChannelError> {
        // Redis 側で同一チャンネルの SUBSCRIBE は冪等
        self.sink
            .lock()
            .await
            .subscribe(channel)
            .await
            .map_err(|e| backend("SUBSCRIBE failed", e))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), ChannelError> {
        self.sink
            .lock()
            .await
            .unsubscribe(channel)
            .await
            .map_err(|e| backend("UNSUBSCRIBE failed", e))
    }

    async fn recv(&self) -> Option<Inbound> {
        let msg = self.stream.lock().await.next().await?;
        Some(to_inbound(msg.get_channel_name(), msg.get_payload_bytes()))
    }

    async fn discard_pending(&self) -> usize {
        let mut stream = self.stream.lock().await;
        let mut discarded = 0;
        while let Some(Some(_)) = stream.next().now_or_never() {
            discarded += 1;
        }
        discarded
    }
}
