//! RecordingReporter - 報告された dispatch 失敗をメモリに残す

use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{DispatchError, FailReason, TaskKey};
use crate::ports::ErrorReporter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFailure {
    pub channel: String,
    pub task: Option<TaskKey>,
    pub reason: FailReason,
    pub message: String,
}

/// Clone しても同じ記録を共有する
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    failures: Arc<Mutex<Vec<RecordedFailure>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<RecordedFailure> {
        self.failures.lock().clone()
    }

    pub fn reasons(&self) -> Vec<FailReason> {
        self.failures.lock().iter().map(|f| f.reason).collect()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, channel: &str, task: Option<&TaskKey>, error: &DispatchError) {
        self.failures.lock().push(RecordedFailure {
            channel: channel.to_string(),
            task: task.cloned(),
            reason: error.reason(),
            message: error.to_string(),
        });
    }
}
