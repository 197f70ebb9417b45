//! 探索全体の起動と後始末

use std::thread;
use std::time::Instant;

use chrono::Local;
use crossbeam_channel as chan;
use serde::Serialize;

use super::collector::collect;
use super::config::BookConfig;
use super::coordinator::{Coordinator, ProgressSnapshot};
use super::error::BookError;
use super::frontier::Frontier;
use super::line::SearchLine;
use super::pgn::BookSink;
use super::position::RootPosition;
use super::worker::{run_worker, WorkerContext, WorkerExit};
use crate::engine::EngineFactory;

/// 1回の実行結果
#[derive(Debug, Clone, Serialize)]
pub struct BookSummary {
    pub started_at: String,
    pub elapsed_secs: f64,
    pub workers: usize,
    pub failed_workers: usize,
    #[serde(flatten)]
    pub progress: ProgressSnapshot,
    pub written: u64,
    pub sink_failures: u64,
}

/// ルートから探索し、採用したラインをすべて `sink` に書き出す。
///
/// 一部のワーカーが失敗しても残りで探索を続ける。全ワーカーが失敗した場合のみエラー。
pub fn generate_book<F, S>(
    cfg: &BookConfig,
    root: &RootPosition,
    factory: &F,
    sink: &mut S,
) -> Result<BookSummary, BookError>
where
    F: EngineFactory,
    S: BookSink,
{
    cfg.validate()?;
    let started_at = Local::now();
    let start = Instant::now();
    log::info!(
        "bookgen: workers={} budget={} max_depth={} nodes={} root={}",
        cfg.workers,
        cfg.initial_budget,
        cfg.max_depth,
        cfg.nodes,
        root.fen().unwrap_or("startpos")
    );

    let frontier = Frontier::new();
    let coordinator = Coordinator::new(cfg.workers, cfg.poll_interval());
    coordinator.push(&frontier, SearchLine::root(cfg.initial_budget));
    let ctx = WorkerContext {
        cfg,
        root,
        frontier: &frontier,
        coordinator: &coordinator,
    };

    let (tx, rx) = chan::unbounded::<SearchLine>();
    let (exits, stats) = thread::scope(|s| {
        let handles: Vec<_> = (0..cfg.workers)
            .map(|id| {
                let tx = tx.clone();
                let ctx = &ctx;
                s.spawn(move || run_worker(id, factory, ctx, tx))
            })
            .collect();
        // 送信側はワーカーだけが持つ
        drop(tx);
        let stats = collect(&rx, sink, &coordinator, cfg.report_interval());
        let exits: Vec<WorkerExit> = handles
            .into_iter()
            .enumerate()
            .map(|(id, h)| {
                h.join().unwrap_or_else(|_| {
                    log::error!("worker {id} panicked");
                    WorkerExit::Failed
                })
            })
            .collect();
        (exits, stats)
    });

    let failed_workers = exits.iter().filter(|e| **e == WorkerExit::Failed).count();
    let summary = BookSummary {
        started_at: started_at.to_rfc3339(),
        elapsed_secs: start.elapsed().as_secs_f64(),
        workers: cfg.workers,
        failed_workers,
        progress: coordinator.snapshot(),
        written: stats.written,
        sink_failures: stats.sink_failures,
    };
    if failed_workers == cfg.workers {
        return Err(BookError::AllWorkersFailed(cfg.workers));
    }
    if failed_workers > 0 {
        log::warn!(
            "run degraded: {failed_workers} of {} workers failed",
            cfg.workers
        );
    }
    log::info!(
        "done: analyzed={} written={} pruned={} sink_failures={} in {:.1}s",
        summary.progress.analyzed,
        summary.written,
        summary.progress.pruned,
        summary.sink_failures,
        summary.elapsed_secs
    );
    Ok(summary)
}
