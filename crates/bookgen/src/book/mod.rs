//! 損失許容量（budget）付き最良優先探索による定跡生成
//!
//! ルートから、各手の評価損を budget から差し引きながらラインを伸ばしていく。
//! 未展開ラインは budget の大きい順にフロンティアから取り出され、
//! 複数のワーカー（それぞれ専用のエンジンを持つ）が並列に展開する。
//! 採用された子ラインはすべて結果チャネル経由で1本の書き出し先に渡る。

pub mod collector;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod frontier;
pub mod line;
pub mod pgn;
pub mod position;
pub mod worker;


use std::sync::{Mutex, MutexGuard};

pub use config::{BookConfig, BreadthSchedule};
pub use coordinator::{Coordinator, IdleOutcome, ProgressSnapshot};
pub use driver::{generate_book, BookSummary};
pub use error::BookError;
pub use frontier::Frontier;
pub use line::SearchLine;
pub use pgn::{BookSink, Outcome, PgnWriter};
pub use position::RootPosition;

/// Poisoned 状態の Mutex も中身を取り出して使い続ける。
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::error!("Mutex was poisoned, attempting recovery");
            poisoned.into_inner()
        }
    }
}
