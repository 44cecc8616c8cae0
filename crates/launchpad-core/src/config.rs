//! Settings - worker プロセスの設定
//!
//! 既定値を持つ設定値。CLI は環境変数とフラグ（clap の env）でこれを上書きします。

use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_TASKS_HASH;

pub const ENV_REDIS_URL: &str = "LAUNCHPAD_REDIS_URL";
pub const ENV_TASKS_HASH: &str = "LAUNCHPAD_TASKS_HASH";
pub const ENV_CHANNEL: &str = "CHANNEL";
pub const ENV_RUNNABLES: &str = "LAUNCHPAD_RUNNABLES";
pub const ENV_RECALCULATE: &str = "LAUNCHPAD_RECALCULATE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub redis_url: String,
    pub tasks_hash: String,
    pub channel: String,
    /// `builtin` または manifest ファイルのパス
    pub runnables: String,
    pub recalculate_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            tasks_hash: DEFAULT_TASKS_HASH.to_string(),
            channel: "launchpad".to_string(),
            runnables: "builtin".to_string(),
            recalculate_on_start: false,
        }
    }
}
