//! launchpad-core
//!
//! 共有 KV ストアに保存したタスクを、pub/sub の RUN シグナルで実行する
//! 最小の分散タスクディスパッチャ。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskRecord, Message, DispatchState, errors）
//! - **ports**: 抽象化レイヤー（HashStore, MessageChannel, Runnable, ErrorReporter, Clock）
//! - **store**: TaskRecord の永続化（TaskStore）
//! - **typed**: Runnable の登録と型付き API（RunnableRegistry, Task, Handler）
//! - **app**: Dispatcher / Launchpad / recovery / builder
//! - **impls**: InMemory 実装と Redis 実装（feature `redis`）
//! - **config**: Settings

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod store;
pub mod typed;

pub use app::{Dispatcher, Launchpad, LaunchpadBuilder, RecalculateSummary};
pub use config::Settings;
pub use domain::{Completion, Message, TaskKey, TaskRecord};
pub use store::TaskStore;
pub use typed::RunnableRegistry;
