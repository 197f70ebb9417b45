//! 未展開ラインの優先度付きキュー
//!
//! budget が大きい（= ここまでの損失が小さい）ラインから取り出す。
//! 同じ budget なら先に積まれた方を先に返す。

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use super::line::SearchLine;
use super::lock_or_recover;

struct Entry {
    line: SearchLine,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap は最大値を返すので seq は逆順に比較する
        self.line
            .budget()
            .cmp(&other.line.budget())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

/// 全ワーカーで共有するフロンティア。容量制限なし、ブロックしない。
#[derive(Default)]
pub struct Frontier {
    inner: Mutex<Inner>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: SearchLine) {
        let mut inner = lock_or_recover(&self.inner);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Entry { line, seq });
    }

    /// 最も有望なラインを取り出す。空なら `None`。
    pub fn try_pop(&self) -> Option<SearchLine> {
        lock_or_recover(&self.inner).heap.pop().map(|e| e.line)
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.inner).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
