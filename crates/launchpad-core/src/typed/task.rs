//! Task trait - 型付き params の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (DeserializeOwned + Send + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{Params, TaskRecord};

/// Task は runnable 名と params の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct AudioTask {
///     src: String,
///     dest: String,
/// }
///
/// impl Task for AudioTask {
///     const TYPE: &'static str = "audio";
/// }
/// ```
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// TaskRecord の `type` に入る名前
    const TYPE: &'static str;

    /// producer 側: この params で TaskRecord を作る
    fn into_record(self) -> Result<TaskRecord, serde_json::Error> {
        let params = match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => map,
            _ => Params::new(),
        };
        Ok(TaskRecord::new(Self::TYPE, params))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::EchoTask;
    use super::*;

    #[test]
    fn into_record_uses_type_and_fields() {
        let record = EchoTask { value: 7 }.into_record().unwrap();
        assert_eq!(record.task_type, "echo");
        assert_eq!(record.params.get("value"), Some(&serde_json::json!(7)));
        assert!(!record.complete);
    }
}
