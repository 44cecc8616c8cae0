//! FnRunnable - クロージャで作る Runnable
//!
//! 呼び出しごとに新しい future を作ります。状態を共有したい場合は
//! クロージャ内で明示的に `Arc<...>` を使ってください。

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Params, RunnableError};
use crate::ports::Runnable;

pub struct FnRunnable<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> FnRunnable<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Registry に渡せる `Arc` で作成
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Runnable for FnRunnable<F>
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RunnableError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, params: Params) -> Result<Value, RunnableError> {
        (self.f)(params).await
    }
}
