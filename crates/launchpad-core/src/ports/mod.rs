//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。外部システム（Redis の hash /
//! pub/sub）や差し替えたい依存（runnable、時刻、エラー報告先）への
//! インターフェースを定義します。
//!
//! # 設計原則
//! - 共有ストア（hash）が唯一の共有可変リソース
//! - pub/sub は task key だけを運ぶ（record 本体は hash に保存）

pub mod clock;
pub mod hash_store;
pub mod key_generator;
pub mod message_channel;
pub mod reporter;
pub mod runnable;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::hash_store::HashStore;
pub use self::key_generator::{KeyGenerator, UlidKeyGenerator};
pub use self::message_channel::MessageChannel;
pub use self::reporter::{ErrorReporter, TracingReporter};
pub use self::runnable::{Runnable, RunnableSource};
