//! Runnable port - task の type 名で引かれる実行ハンドラ
//!
//! `Runnable` は名前付きの実行能力です。Registry に登録され、
//! Dispatcher が `TaskRecord::task_type` で lookup して呼び出します。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Params, RegistryError, RunnableError};

/// Runnable は params を受け取り result か error のどちらか一方を返す
///
/// 長時間かかる処理（外部プロセス起動など）でも構いません。
/// Dispatcher は独立した tokio task 上で await するので、受信は止まりません。
/// タイムアウトが必要なら runnable 側で扱います。
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, params: Params) -> Result<Value, RunnableError>;
}

/// RunnableSource は Registry に一括登録する runnable の供給元
///
/// 例: CLI に組み込まれた runnable 群、manifest ファイルから作る runnable 群。
pub trait RunnableSource: Send + Sync {
    /// ログ・エラー表示用の名前
    fn source_name(&self) -> &str;

    fn load(&self) -> Result<Vec<Arc<dyn Runnable>>, RegistryError>;
}

impl RunnableSource for Vec<Arc<dyn Runnable>> {
    fn source_name(&self) -> &str {
        "static"
    }

    fn load(&self) -> Result<Vec<Arc<dyn Runnable>>, RegistryError> {
        Ok(self.clone())
    }
}
