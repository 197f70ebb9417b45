//! ワーカー間の終了検出と進捗カウンタ
//!
//! 新しいラインを作れるのは動いているワーカーだけなので、生きている全ワーカーが
//! 同時に待機状態になった時点でフロンティアは二度と埋まらない。
//! 待機中のワーカーはフロンティアをポーリングし、その条件を見たら終了する。
//!
//! - 待機カウンタ（idle / active）
//! - 進捗カウンタ（queued / analyzed / ...）
//! - 展開済み局面の集合（transposition 検出用）
//!
//! の3つはそれぞれ別のロックで守る。

use std::collections::HashSet;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use super::frontier::Frontier;
use super::line::SearchLine;
use super::lock_or_recover;

/// 待機プロトコルの結果
#[derive(Debug)]
pub enum IdleOutcome {
    /// 新しい仕事が見つかった
    Work(SearchLine),
    /// 探索は尽きた
    Exhausted,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// フロンティアに積まれているライン数
    pub queued: u64,
    /// 取り出したライン数（単調増加）
    pub analyzed: u64,
    /// 採用した子ライン数
    pub accepted: u64,
    /// 枝刈りした候補数
    pub pruned: u64,
    /// 手数上限で展開しなかったライン数
    pub expired: u64,
    /// 既に展開済みの局面だったライン数
    pub transpositions: u64,
}

impl ProgressSnapshot {
    /// analyzed / (analyzed + queued)。まだ何も解析していなければ `None`。
    pub fn fraction_done(&self) -> Option<f64> {
        if self.analyzed == 0 {
            return None;
        }
        Some(self.analyzed as f64 / (self.analyzed + self.queued) as f64)
    }
}

struct IdleState {
    idle: usize,
    active: usize,
}

pub struct Coordinator {
    idle: Mutex<IdleState>,
    progress: Mutex<ProgressSnapshot>,
    seen: Mutex<HashSet<String>>,
    poll_interval: Duration,
}

impl Coordinator {
    pub fn new(workers: usize, poll_interval: Duration) -> Self {
        Self {
            idle: Mutex::new(IdleState {
                idle: 0,
                active: workers,
            }),
            progress: Mutex::new(ProgressSnapshot::default()),
            seen: Mutex::new(HashSet::new()),
            poll_interval,
        }
    }

    /// カウンタを更新してからフロンティアに積む。
    pub fn push(&self, frontier: &Frontier, line: SearchLine) {
        lock_or_recover(&self.progress).queued += 1;
        frontier.push(line);
    }

    /// フロンティアから取り出し、取り出せたらカウンタを更新する。
    pub fn pop(&self, frontier: &Frontier) -> Option<SearchLine> {
        let line = frontier.try_pop()?;
        let mut progress = lock_or_recover(&self.progress);
        progress.queued = progress.queued.saturating_sub(1);
        progress.analyzed += 1;
        Some(line)
    }

    /// フロンティアが空だったワーカーが呼ぶ。仕事が現れるか、探索が尽きるまで戻らない。
    pub fn wait_for_work(&self, frontier: &Frontier) -> IdleOutcome {
        lock_or_recover(&self.idle).idle += 1;
        loop {
            thread::sleep(self.poll_interval);
            // 取り出しと idle の減算を同じロック下で行い、
            // 仕事を抱えた待機ワーカーを「全員待機」と誤認しないようにする
            let mut state = lock_or_recover(&self.idle);
            if let Some(line) = self.pop(frontier) {
                state.idle -= 1;
                return IdleOutcome::Work(line);
            }
            if state.idle >= state.active {
                // 終了するワーカーは idle を戻さない
                return IdleOutcome::Exhausted;
            }
        }
    }

    /// エンジン障害で離脱するワーカーが呼ぶ。以降の終了判定は残りのワーカー数で行う。
    pub fn retire_worker(&self) {
        let mut state = lock_or_recover(&self.idle);
        state.active = state.active.saturating_sub(1);
    }

    pub fn active_workers(&self) -> usize {
        lock_or_recover(&self.idle).active
    }

    pub fn idle_workers(&self) -> usize {
        lock_or_recover(&self.idle).idle
    }

    /// 初めて見る局面なら記録して true。
    pub fn first_visit(&self, key: String) -> bool {
        lock_or_recover(&self.seen).insert(key)
    }

    /// 展開に失敗したラインを戻すときに記録を取り消す。
    pub fn forget_visit(&self, key: &str) {
        lock_or_recover(&self.seen).remove(key);
    }

    pub fn record_expansion(&self, accepted: u64, pruned: u64) {
        let mut progress = lock_or_recover(&self.progress);
        progress.accepted += accepted;
        progress.pruned += pruned;
    }

    pub fn record_expired(&self) {
        lock_or_recover(&self.progress).expired += 1;
    }

    pub fn record_transposition(&self) {
        lock_or_recover(&self.progress).transpositions += 1;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *lock_or_recover(&self.progress)
    }
}
