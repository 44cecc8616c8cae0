//! Message - pub/sub で流れる RUN / COMPLETE シグナル
//!
//! メッセージは永続化されません。ワイヤ形式は JSON で、`type` フィールドに
//! `"task:run"` / `"task:complete"` を持ちます。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{MessageError, RunnableError};
use super::task::TaskKey;

/// メッセージ種別（`type` フィールドの値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Run,
    Complete,
}

impl MessageKind {
    pub const RUN: &'static str = "task:run";
    pub const COMPLETE: &'static str = "task:complete";

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            Self::RUN => Some(MessageKind::Run),
            Self::COMPLETE => Some(MessageKind::Complete),
            _ => None,
        }
    }
}

/// 実行結果の通知内容（COMPLETE の本体）
///
/// `success` と `error` は排他: 成功なら `error` は null、失敗なら `result` は null。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub task: TaskKey,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Value,
}

impl Completion {
    /// runnable の戻り値から Completion を組み立てる
    pub fn from_outcome(task: TaskKey, outcome: Result<Value, RunnableError>) -> Self {
        match outcome {
            Ok(result) => Self {
                task,
                success: true,
                error: None,
                result,
            },
            Err(err) => Self {
                task,
                success: false,
                error: Some(err.to_string()),
                result: Value::Null,
            },
        }
    }

    /// 既に complete なタスクの再通知用（recovery sweep）
    pub fn announce(task: TaskKey) -> Self {
        Self {
            task,
            success: true,
            error: None,
            result: Value::String(String::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "task:run")]
    Run { task: TaskKey },

    #[serde(rename = "task:complete")]
    Complete(Completion),
}

impl Message {
    pub fn run(task: TaskKey) -> Self {
        Message::Run { task }
    }

    /// raw payload をデコード
    ///
    /// JSON として読めないものと、`type` が未知のものを区別して返します。
    pub fn decode(raw: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(raw).map_err(MessageError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingType)?;
        if MessageKind::parse(kind).is_none() {
            return Err(MessageError::UnknownType(kind.to_string()));
        }
        serde_json::from_value(value).map_err(MessageError::Malformed)
    }

    pub fn encode(&self) -> Result<String, MessageError> {
        serde_json::to_string(self).map_err(MessageError::Malformed)
    }
}

/// MessageChannel から届く 1 件（チャンネル名 + 生 payload）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub channel: String,
    pub payload: String,
}

impl Inbound {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}
