//! 解析ワーカー
//!
//! 1ワーカー = 1エンジンセッション。フロンティアからラインを取り出して展開し、
//! 採用した子ラインをフロンティアと結果チャネルの両方に渡す。

use anyhow::{anyhow, Result};
use crossbeam_channel as chan;

use super::config::BookConfig;
use super::coordinator::{Coordinator, IdleOutcome};
use super::frontier::Frontier;
use super::line::SearchLine;
use super::position::{resolve_move, transposition_key, RootPosition};
use crate::engine::{EngineFactory, EngineSession, EvalRequest};

/// ワーカー間で共有する探索状態
pub struct WorkerContext<'a> {
    pub cfg: &'a BookConfig,
    pub root: &'a RootPosition,
    pub frontier: &'a Frontier,
    pub coordinator: &'a Coordinator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// 探索が尽きて正常終了
    Exhausted,
    /// エンジン障害で離脱
    Failed,
}

/// 1ラインの展開結果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Expansion {
    pub accepted: u64,
    pub pruned: u64,
}

/// panic で抜けたワーカーも終了判定から外す
struct RetireOnPanic<'a>(&'a Coordinator);

impl Drop for RetireOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.retire_worker();
        }
    }
}

/// ワーカーのメインループ。探索が尽きるか、エンジン障害で戻る。
pub fn run_worker<F: EngineFactory>(
    id: usize,
    factory: &F,
    ctx: &WorkerContext<'_>,
    results: chan::Sender<SearchLine>,
) -> WorkerExit {
    let _guard = RetireOnPanic(ctx.coordinator);
    let mut session = match factory.open(id) {
        Ok(session) => session,
        Err(e) => {
            log::error!("worker {id}: failed to open engine session: {e:#}");
            ctx.coordinator.retire_worker();
            return WorkerExit::Failed;
        }
    };
    let mut expanded = 0u64;
    loop {
        let line = match ctx.coordinator.pop(ctx.frontier) {
            Some(line) => line,
            None => match ctx.coordinator.wait_for_work(ctx.frontier) {
                IdleOutcome::Work(line) => line,
                IdleOutcome::Exhausted => {
                    log::debug!("worker {id}: search exhausted after {expanded} lines");
                    return WorkerExit::Exhausted;
                }
            },
        };
        match expand(&mut session, ctx, &line, &results) {
            Ok(_) => expanded += 1,
            Err(e) => {
                log::error!(
                    "worker {id}: engine session failed at ply {}, worker retires: {e:#}",
                    line.ply()
                );
                requeue(ctx, line);
                ctx.coordinator.retire_worker();
                return WorkerExit::Failed;
            }
        }
    }
}

/// 展開しきれなかったラインを他のワーカーのために戻す。
fn requeue(ctx: &WorkerContext<'_>, line: SearchLine) {
    if ctx.cfg.skip_transpositions {
        let pos = ctx.root.replay(line.moves());
        ctx.coordinator.forget_visit(&transposition_key(&pos));
    }
    ctx.coordinator.push(ctx.frontier, line);
}

/// 1ラインを展開する。
///
/// エラーはセッション障害（エンジンの異常終了・応答なし・非合法手）のみ。
pub fn expand<S: EngineSession>(
    session: &mut S,
    ctx: &WorkerContext<'_>,
    line: &SearchLine,
    results: &chan::Sender<SearchLine>,
) -> Result<Expansion> {
    let cfg = ctx.cfg;
    let ply = line.ply();
    if ply >= cfg.max_depth {
        ctx.coordinator.record_expired();
        return Ok(Expansion::default());
    }

    let pos = ctx.root.replay(line.moves());
    if cfg.skip_transpositions && !ctx.coordinator.first_visit(transposition_key(&pos)) {
        ctx.coordinator.record_transposition();
        return Ok(Expansion::default());
    }

    let moves = RootPosition::uci_moves(line.moves());
    let breadth = cfg.breadth.breadth_for_ply(ply);
    let req = EvalRequest {
        root_fen: ctx.root.fen(),
        moves: &moves,
        nodes: cfg.nodes,
        multipv: breadth,
        ply,
    };
    let candidates = session.evaluate(&req)?;

    let mut stats = Expansion::default();
    let Some(best) = candidates.first() else {
        log::debug!("ply {ply}: engine returned no candidates");
        ctx.coordinator.record_expansion(0, 0);
        return Ok(stats);
    };
    let base = best.score.to_cp();
    // 子を1本でも出す前に全候補を検証する（失敗したラインは再投入されるため）
    let resolved = candidates
        .iter()
        .map(|cand| {
            // 順位と評価値が食い違っても損失は負にしない
            let loss = base.saturating_sub(cand.score.to_cp()).max(0);
            resolve_move(&pos, &cand.uci, ply).map(|mv| (mv, loss))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for (mv, loss) in resolved {
        let Some(child) = line.extend(mv, loss) else {
            stats.pruned += 1;
            continue;
        };
        stats.accepted += 1;
        if child.ply() < cfg.max_depth {
            ctx.coordinator.push(ctx.frontier, child.clone());
        } else {
            ctx.coordinator.record_expired();
        }
        results
            .send(child)
            .map_err(|_| anyhow!("result channel closed"))?;
    }
    log::debug!(
        "ply {ply}: breadth {breadth}, {} candidates, accepted {}, pruned {}",
        candidates.len(),
        stats.accepted,
        stats.pruned
    );
    ctx.coordinator.record_expansion(stats.accepted, stats.pruned);
    Ok(stats)
}
