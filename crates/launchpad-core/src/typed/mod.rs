//! Typed - Runnable の登録と型付き API
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `Runnable` trait - object-safe, type erasure
//!
//! どちらで作った runnable も `RunnableRegistry` に同じ形で入ります。

pub mod fn_runnable;
pub mod handler;
pub mod registry;
pub mod task;

pub use self::fn_runnable::FnRunnable;
pub use self::handler::{Handler, TypedRunnable};
pub use self::registry::RunnableRegistry;
pub use self::task::Task;
