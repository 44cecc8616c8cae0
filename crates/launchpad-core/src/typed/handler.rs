//! Handler trait - 型付き Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (Runnable)
//! - Type erasure パターン (TypedRunnable<T, H> → dyn Runnable)

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;

use super::task::Task;
use crate::domain::{Params, RunnableError};
use crate::ports::Runnable;

/// Handler は Task を実行して result を返す
///
/// # 使用例
/// ```ignore
/// struct AudioHandler;
///
/// #[async_trait]
/// impl Handler<AudioTask> for AudioHandler {
///     async fn handle(&self, task: AudioTask) -> Result<Value, RunnableError> {
///         transcode(&task.src, &task.dest).await
///     }
/// }
/// ```
///
/// # ジェネリクスによる型安全性
/// - `Handler<AudioTask>` は `AudioTask` しか受け取れない
/// - 登録名は `AudioTask::TYPE` から決まるので typo が入らない
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T) -> Result<Value, RunnableError>;
}

/// TypedRunnable は Handler<T> を dyn Runnable に変換する
///
/// params のデコード失敗は runnable の失敗（COMPLETE に記録される）として扱います。
pub struct TypedRunnable<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedRunnable<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> Runnable for TypedRunnable<T, H> {
    fn name(&self) -> &str {
        T::TYPE
    }

    async fn run(&self, params: Params) -> Result<Value, RunnableError> {
        let task: T = serde_json::from_value(Value::Object(params))?;
        self.handler.handle(task).await
    }
}
