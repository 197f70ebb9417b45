//! 評価エンジンとのセッション
//!
//! 探索本体は `EngineFactory` / `EngineSession` だけに依存する。
//! 実運用では `EngineConfig` が UCI エンジンプロセスを1ワーカーにつき1本起動する。

pub mod process;
pub mod types;

use anyhow::Result;

pub use process::{EngineConfig, UciEngine};
pub use types::{Candidate, EvalRequest, PvLine, Score, MATE_SCORE};

/// ワーカーが専有する1本のエンジンセッション。
///
/// 解放は drop で行う（ワーカーのどの終了経路でも1回だけ解放される）。
pub trait EngineSession {
    /// 局面を解析し、良い順に並んだ候補手を返す。評価値は手番側から見た値。
    fn evaluate(&mut self, req: &EvalRequest<'_>) -> Result<Vec<Candidate>>;
}

/// ワーカーごとにセッションを開く。
pub trait EngineFactory: Sync {
    type Session: EngineSession;

    fn open(&self, worker_id: usize) -> Result<Self::Session>;
}

impl EngineSession for UciEngine {
    fn evaluate(&mut self, req: &EvalRequest<'_>) -> Result<Vec<Candidate>> {
        let lines = self.analyse(req)?;
        Ok(lines
            .into_iter()
            .filter_map(|line| {
                line.first_move().map(|uci| Candidate {
                    uci: uci.to_string(),
                    score: line.score,
                })
            })
            .collect())
    }
}

impl EngineFactory for EngineConfig {
    type Session = UciEngine;

    fn open(&self, worker_id: usize) -> Result<UciEngine> {
        UciEngine::spawn(self, format!("engine#{worker_id}"))
    }
}
