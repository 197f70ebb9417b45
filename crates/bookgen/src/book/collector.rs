//! 結果回収
//!
//! ワーカーを起動したスレッドで動き、採用ラインを書き出し先に渡しながら
//! 一定間隔で進捗を表示する。全ワーカーが結果チャネルの送信側を手放したら終わる。

use std::time::{Duration, Instant};

use crossbeam_channel as chan;

use super::coordinator::Coordinator;
use super::line::SearchLine;
use super::pgn::{BookSink, Outcome};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectorStats {
    /// 書き出せたライン数
    pub written: u64,
    /// 書き出しに失敗した回数
    pub sink_failures: u64,
}

impl CollectorStats {
    fn persist<S: BookSink>(&mut self, sink: &mut S, line: &SearchLine) {
        match sink.append(line, Outcome::Draw) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.sink_failures += 1;
                log::warn!("failed to write book line ({} plies): {e:#}", line.ply());
            }
        }
    }

    fn flush<S: BookSink>(&mut self, sink: &mut S) {
        if let Err(e) = sink.flush() {
            self.sink_failures += 1;
            log::warn!("failed to flush book output: {e:#}");
        }
    }
}

/// 送信側がすべて drop されるまで結果を受け取り続ける。
pub fn collect<S: BookSink>(
    rx: &chan::Receiver<SearchLine>,
    sink: &mut S,
    coordinator: &Coordinator,
    report_interval: Duration,
) -> CollectorStats {
    let mut stats = CollectorStats::default();
    let mut next_report = Instant::now() + report_interval;
    loop {
        match rx.recv_deadline(next_report) {
            Ok(line) => stats.persist(sink, &line),
            Err(chan::RecvTimeoutError::Timeout) => {
                stats.flush(sink);
                report_progress(coordinator);
                next_report = Instant::now() + report_interval;
            }
            Err(chan::RecvTimeoutError::Disconnected) => break,
        }
    }
    // 切断後に残っている分を回収
    for line in rx.try_iter() {
        stats.persist(sink, &line);
    }
    stats.flush(sink);
    stats
}

fn report_progress(coordinator: &Coordinator) {
    let snap = coordinator.snapshot();
    if let Some(done) = snap.fraction_done() {
        log::info!(
            "queue/total: {}/{} ({:.2} % done)",
            snap.queued,
            snap.queued + snap.analyzed,
            done * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use anyhow::{bail, Result};

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        plies: Vec<usize>,
        fail_every: Option<usize>,
        calls: usize,
        flushes: usize,
    }

    impl BookSink for RecordingSink {
        fn append(&mut self, line: &SearchLine, outcome: Outcome) -> Result<()> {
            assert_eq!(outcome, Outcome::Draw);
            self.calls += 1;
            if self.fail_every.is_some_and(|n| self.calls % n == 0) {
                bail!("disk full");
            }
            self.plies.push(line.ply());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn drains_everything_sent_before_disconnect() {
        let (tx, rx) = chan::unbounded();
        let coordinator = Coordinator::new(1, Duration::from_millis(5));
        let producer = thread::spawn(move || {
            for _ in 0..50 {
                tx.send(SearchLine::root(1)).unwrap();
            }
            thread::sleep(Duration::from_millis(30));
            for _ in 0..25 {
                tx.send(SearchLine::root(1)).unwrap();
            }
        });
        let mut sink = RecordingSink::default();
        let stats = collect(&rx, &mut sink, &coordinator, Duration::from_millis(10));
        producer.join().unwrap();
        assert_eq!(stats.written, 75);
        assert_eq!(stats.sink_failures, 0);
        assert_eq!(sink.plies.len(), 75);
        assert!(sink.flushes >= 1);
    }

    #[test]
    fn returns_promptly_when_nothing_is_produced() {
        let (tx, rx) = chan::unbounded::<SearchLine>();
        drop(tx);
        let coordinator = Coordinator::new(1, Duration::from_millis(5));
        let mut sink = RecordingSink::default();
        let start = Instant::now();
        let stats = collect(&rx, &mut sink, &coordinator, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(stats, CollectorStats::default());
    }

    #[test]
    fn sink_failures_are_counted_and_do_not_stop_collection() {
        let (tx, rx) = chan::unbounded();
        for _ in 0..9 {
            tx.send(SearchLine::root(0)).unwrap();
        }
        drop(tx);
        let coordinator = Coordinator::new(1, Duration::from_millis(5));
        let mut sink = RecordingSink {
            fail_every: Some(3),
            ..RecordingSink::default()
        };
        let stats = collect(&rx, &mut sink, &coordinator, Duration::from_millis(10));
        assert_eq!(stats.written, 6);
        assert_eq!(stats.sink_failures, 3);
    }
}
