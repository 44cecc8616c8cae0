//! ErrorReporter port - dispatch 失敗のローカル報告先
//!
//! 失敗は Engine を止めません。報告したら次のメッセージに進みます。

use crate::domain::{DispatchError, TaskKey};

/// ErrorReporter は 1 件の dispatch 失敗を受け取る
pub trait ErrorReporter: Send + Sync {
    fn report(&self, channel: &str, task: Option<&TaskKey>, error: &DispatchError);
}

/// TracingReporter は失敗を `tracing::warn!` で出力する（既定）
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, channel: &str, task: Option<&TaskKey>, error: &DispatchError) {
        tracing::warn!(
            channel,
            task = task.map(TaskKey::as_str),
            reason = ?error.reason(),
            error = %error,
            "dispatch failed"
        );
    }
}
