//! App - アプリケーション層
//!
//! ports を組み合わせて dispatch のロジックを実装します。
//!
//! # 主要コンポーネント
//! - **Dispatcher**: RUN → execute → COMPLETE の状態機械
//! - **Launchpad**: start / subscribe / stop のライフサイクル
//! - **recovery**: 保存済みタスクの再通知・再実行
//! - **LaunchpadBuilder**: ワイヤリングと起動時検証

pub mod builder;
pub mod dispatcher;
pub mod launchpad;
pub mod recovery;

pub use self::builder::{BuildError, LaunchpadBuilder};
pub use self::dispatcher::Dispatcher;
pub use self::launchpad::{Launchpad, SubmitError};
pub use self::recovery::RecalculateSummary;
