//! DispatchState - RUN メッセージ 1 件分の状態機械
//!
//! # 状態遷移
//! ```text
//! Received → Resolving → Executing → Completing → Done
//!               ↓            ↓            ↓
//!            Failed       Failed       Failed
//! ```
//!
//! Failed は `FailReason` を持ちます。runnable 自体の失敗は Failed ではなく、
//! `success: false` の COMPLETE として Done に至ります。

use serde::{Deserialize, Serialize};

/// dispatch を打ち切った理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// payload が読めない、または type が未知
    Malformed,
    /// ストアの読み書きに失敗
    StoreError,
    /// key に対応するタスクがない
    NotFound,
    /// type に対応する runnable が未登録
    RunnableNotFound,
    /// complete は書けたが COMPLETE を publish できなかった
    PublishError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchState {
    Received,
    Resolving,
    Executing,
    Completing,
    Done,
    Failed(FailReason),
}
