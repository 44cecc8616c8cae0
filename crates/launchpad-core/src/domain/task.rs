//! Task record - 共有ストアに保存されるタスクの定義
//!
//! TaskRecord は key を含みません。key は hash の field 名として保存され、
//! 値（record）は JSON としてシリアライズされます。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ports::KeyGenerator;

/// Runnable に渡される任意の構造化 payload。
pub type Params = serde_json::Map<String, serde_json::Value>;

/// TaskKey は producer が割り当てる不透明な識別子
///
/// 順序や形式に意味はありません。`generate()` は ULID ベースの既定キーを
/// 作るためのヘルパーで、任意の文字列を `TaskKey::new` で使っても構いません。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// KeyGenerator から新しいキーを作成
    pub fn generate(generator: &dyn KeyGenerator) -> Self {
        generator.generate_key()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// TaskRecord はストアに保存される作業の記述
///
/// # 不変条件
/// - 書き込みは常に record 全体の置き換え（部分更新なし）
/// - `complete` は Dispatcher が runnable の終了後に一度だけ true にする
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// 実行する runnable の名前
    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub params: Params,

    #[serde(default)]
    pub complete: bool,
}

impl TaskRecord {
    pub fn new(task_type: impl Into<String>, params: Params) -> Self {
        Self {
            task_type: task_type.into(),
            params,
            complete: false,
        }
    }

    /// params なしの record を作成
    pub fn of_type(task_type: impl Into<String>) -> Self {
        Self::new(task_type, Params::new())
    }

    /// complete = true にしたコピーを返す
    pub fn completed(mut self) -> Self {
        self.complete = true;
        self
    }
}

/// `GetTasks` の 1 件分（key + record）。
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTask {
    pub key: TaskKey,
    pub record: TaskRecord,
}
