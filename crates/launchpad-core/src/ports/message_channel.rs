//! MessageChannel port - 名前付きチャンネルの pub/sub
//!
//! TaskStore とは独立しています。1 つの MessageChannel は 1 つの購読者
//! （= 1 つの Dispatcher）に対応し、購読中の全チャンネルからの受信を
//! 単一のストリームとして `recv()` で取り出します。

use async_trait::async_trait;

use crate::domain::{ChannelError, Inbound};

/// MessageChannel は publish / subscribe / 受信ストリームを提供
///
/// # 契約
/// - `publish` は fire-and-forget（その時点の購読者全員に届く）
/// - `subscribe` / `unsubscribe` は冪等（二重購読で重複配信しない）
/// - 同一チャンネル内の配信順序は publish 順
/// - `recv` は cancel-safe（`select!` で中断しても取りこぼさない）
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ChannelError>;

    async fn subscribe(&self, channel: &str) -> Result<(), ChannelError>;

    async fn unsubscribe(&self, channel: &str) -> Result<(), ChannelError>;

    /// 次の受信メッセージを待つ。チャンネルが閉じたら `None`
    async fn recv(&self) -> Option<Inbound>;

    /// 既に届いていて未読のメッセージを捨て、捨てた件数を返す（待たない）
    async fn discard_pending(&self) -> usize;
}
