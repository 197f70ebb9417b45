use std::io::Write;

use anyhow::{Context, Result};

use super::line::SearchLine;
use super::position::RootPosition;

/// 定跡エントリに付ける名目上の対局結果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    WhiteWin,
    BlackWin,
    Draw,
    Unknown,
}

impl Outcome {
    pub fn pgn_label(self) -> &'static str {
        match self {
            Outcome::WhiteWin => "1-0",
            Outcome::BlackWin => "0-1",
            Outcome::Draw => "1/2-1/2",
            Outcome::Unknown => "*",
        }
    }
}

/// 採用されたラインの書き出し先
pub trait BookSink {
    fn append(&mut self, line: &SearchLine, outcome: Outcome) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// 1ライン = 1局として PGN を書き出す。
pub struct PgnWriter<W: Write> {
    out: W,
    root: RootPosition,
}

impl<W: Write> PgnWriter<W> {
    pub fn new(out: W, root: RootPosition) -> Self {
        Self { out, root }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> BookSink for PgnWriter<W> {
    fn append(&mut self, line: &SearchLine, outcome: Outcome) -> Result<()> {
        let label = outcome.pgn_label();
        let movetext = self.root.movetext(line.moves());
        let mut entry = format!("[Result \"{label}\"]\n");
        if let Some(fen) = self.root.fen() {
            entry.push_str(&format!("[FEN \"{fen}\"]\n[SetUp \"1\"]\n"));
        }
        entry.push('\n');
        if movetext.is_empty() {
            entry.push_str(label);
        } else {
            entry.push_str(&format!("{movetext} {label}"));
        }
        entry.push_str("\n\n");
        self.out.write_all(entry.as_bytes()).context("failed to write PGN entry")
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().context("failed to flush PGN output")
    }
}
