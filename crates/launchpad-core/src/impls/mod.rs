//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryHashStore** / **InMemoryBroker**: 開発・テスト用
//! - **RecordingReporter**: 失敗を記録する ErrorReporter（テスト・組み込み用）
//! - **RedisHashStore** / **RedisChannel**: 本番用（feature `redis`）

pub mod memory_channel;
pub mod memory_hash;
pub mod recording_reporter;

#[cfg(feature = "redis")]
pub mod redis_channel;
#[cfg(feature = "redis")]
pub mod redis_hash;

pub use self::memory_channel::{InMemoryBroker, InMemoryChannel};
pub use self::memory_hash::InMemoryHashStore;
pub use self::recording_reporter::{RecordedFailure, RecordingReporter};

#[cfg(feature = "redis")]
pub use self::redis_channel::RedisChannel;
#[cfg(feature = "redis")]
pub use self::redis_hash::RedisHashStore;
