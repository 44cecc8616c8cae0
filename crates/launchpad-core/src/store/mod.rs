//! Store - TaskRecord の永続化

pub mod task_store;

pub use self::task_store::{DEFAULT_TASKS_HASH, TaskStore};
