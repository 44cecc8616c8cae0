//! Errors - エラー型と分類
//!
//! # 分類
//! - StoreError: ストア層（接続・シリアライズ）。呼び出し元に必ず返す
//! - MessageError: 受信 payload が読めない / type が未知
//! - RunnableError: runnable の実行失敗。Engine の障害ではなく COMPLETE に記録される
//! - ChannelError: pub/sub の障害
//! - RegistryError: runnable source の読み込み失敗
//! - DispatchError: 1 メッセージ分の dispatch を打ち切った理由

use thiserror::Error;

use super::state::FailReason;
use super::task::TaskKey;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("task {key} could not be encoded/decoded: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
            source: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("message channel backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("message has no type field")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// RunnableError は runnable が返す失敗の説明
///
/// 文字列として COMPLETE の `error` フィールドに載ります。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RunnableError {
    message: String,
}

impl RunnableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for RunnableError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid params: {err}"))
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to load runnables from {source_name}: {message}")]
    Load {
        source_name: String,
        message: String,
    },
}

/// DispatchError は `Failed(reason)` 終端状態
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Malformed(#[from] MessageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task not found: {0}")]
    TaskNotFound(TaskKey),

    #[error("runnable not found: {0}")]
    RunnableNotFound(String),

    #[error("failed to publish completion: {0}")]
    Publish(#[from] ChannelError),
}

impl DispatchError {
    pub fn reason(&self) -> FailReason {
        match self {
            DispatchError::Malformed(_) => FailReason::Malformed,
            DispatchError::Store(_) => FailReason::StoreError,
            DispatchError::TaskNotFound(_) => FailReason::NotFound,
            DispatchError::RunnableNotFound(_) => FailReason::RunnableNotFound,
            DispatchError::Publish(_) => FailReason::PublishError,
        }
    }
}
