use std::collections::HashMap;

/// 詰みスコアを有限の値に写像するときの基準値。
pub const MATE_SCORE: i32 = 40_000;
/// これより遠い詰み手数は丸める（壊れた `score mate` でも桁あふれしない）
pub const MAX_MATE_DISTANCE: i32 = 1_000;

/// エンジンが報告する評価値（手番側から見た値）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Score {
    Cp(i32),
    Mate(i32),
}

impl Score {
    /// 比較可能な centipawn 値に変換する。
    ///
    /// `mate n` (n > 0) は `MATE_SCORE - n`、`mate n` (n <= 0) は `-MATE_SCORE - n`。
    /// 早い詰みほど絶対値が大きくなる。`n` は ±`MAX_MATE_DISTANCE` に丸める。
    pub fn to_cp(self) -> i32 {
        match self {
            Score::Cp(cp) => cp,
            Score::Mate(n) => {
                let n = n.clamp(-MAX_MATE_DISTANCE, MAX_MATE_DISTANCE);
                if n > 0 { MATE_SCORE - n } else { -MATE_SCORE - n }
            }
        }
    }
}

/// multipv の1本分。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PvLine {
    pub rank: u32,
    pub score: Score,
    pub pv: Vec<String>,
}

impl PvLine {
    pub fn first_move(&self) -> Option<&str> {
        self.pv.first().map(String::as_str)
    }
}

/// エンジンに渡す1局面分の解析依頼。
pub struct EvalRequest<'a> {
    /// ルート局面の FEN。`None` なら平手初期局面（`position startpos`）。
    pub root_fen: Option<&'a str>,
    /// ルートからの指し手列（UCI 表記）
    pub moves: &'a [String],
    /// 1局面あたりのノード数上限
    pub nodes: u64,
    /// 要求する multipv 本数
    pub multipv: usize,
    pub ply: usize,
}

impl EvalRequest<'_> {
    pub fn position_command(&self) -> String {
        let mut cmd = match self.root_fen {
            Some(fen) => format!("position fen {fen}"),
            None => "position startpos".to_string(),
        };
        if !self.moves.is_empty() {
            cmd.push_str(" moves ");
            cmd.push_str(&self.moves.join(" "));
        }
        cmd
    }
}

/// 候補手1つ（PV の初手とその評価値）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub uci: String,
    pub score: Score,
}

#[derive(Debug, Default)]
pub(crate) struct InfoLine {
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub pv: Vec<String>,
}

/// `info` 行を分解する。`info` で始まらない行は `None`。
pub(crate) fn parse_info_line(line: &str) -> Option<InfoLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first().copied() != Some("info") {
        return None;
    }
    let mut info = InfoLine::default();
    let mut i = 1;
    while i < tokens.len() {
        match tokens[i] {
            "multipv" if i + 1 < tokens.len() => {
                info.multipv = tokens[i + 1].parse::<u32>().ok();
                i += 2;
            }
            "score" if i + 2 < tokens.len() => {
                match tokens[i + 1] {
                    "cp" => info.score = tokens[i + 2].parse::<i32>().ok().map(Score::Cp),
                    "mate" => info.score = tokens[i + 2].parse::<i32>().ok().map(Score::Mate),
                    _ => {}
                }
                // lowerbound / upperbound は読み飛ばす
                i += 3;
            }
            "pv" => {
                info.pv.extend(tokens[i + 1..].iter().map(|s| s.to_string()));
                break;
            }
            // 以降は自由文字列
            "string" => break,
            _ => i += 1,
        }
    }
    Some(info)
}

/// 探索中に流れてくる info 行を rank ごとに集約する。後から来た行で上書きする。
#[derive(Default)]
pub(crate) struct MultipvCollector {
    lines: HashMap<u32, PvLine>,
}

impl MultipvCollector {
    pub fn update(&mut self, line: &str) {
        let Some(info) = parse_info_line(line) else {
            return;
        };
        let Some(score) = info.score else {
            return;
        };
        if info.pv.is_empty() {
            return;
        }
        // multipv 非対応エンジンは multipv を付けない
        let rank = info.multipv.unwrap_or(1);
        self.lines.insert(
            rank,
            PvLine {
                rank,
                score,
                pv: info.pv,
            },
        );
    }

    pub fn into_lines(self) -> Vec<PvLine> {
        let mut lines: Vec<PvLine> = self.lines.into_values().collect();
        lines.sort_by_key(|l| l.rank);
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mate_scores_map_to_bounded_values() {
        assert_eq!(Score::Cp(-35).to_cp(), -35);
        assert_eq!(Score::Mate(3).to_cp(), 39_997);
        assert_eq!(Score::Mate(-2).to_cp(), -39_998);
        assert_eq!(Score::Mate(0).to_cp(), -40_000);
        // 早い詰みの方が良い
        assert!(Score::Mate(1).to_cp() > Score::Mate(5).to_cp());
        assert!(Score::Mate(-5).to_cp() > Score::Mate(-1).to_cp());
        assert!(Score::Cp(2_000).to_cp() < Score::Mate(30).to_cp());
    }

    #[test]
    fn absurd_mate_distances_are_clamped() {
        assert_eq!(Score::Mate(i32::MIN).to_cp(), -MATE_SCORE + MAX_MATE_DISTANCE);
        assert_eq!(Score::Mate(i32::MAX).to_cp(), MATE_SCORE - MAX_MATE_DISTANCE);
        assert!(Score::Mate(i32::MIN).to_cp() < Score::Cp(-30_000).to_cp());
        assert_eq!(Score::Mate(-1_000).to_cp(), Score::Mate(-5_000).to_cp());

        let mut c = MultipvCollector::default();
        c.update("info depth 1 multipv 1 score mate -2147483648 pv e2e4");
        let lines = c.into_lines();
        assert_eq!(lines[0].score, Score::Mate(i32::MIN));
        assert_eq!(lines[0].score.to_cp(), -39_000);
    }

    #[test]
    fn parses_multipv_info_line() {
        let info = parse_info_line(
            "info depth 18 seldepth 25 multipv 2 score cp -12 nodes 1000000 nps 900000 pv d2d4 d7d5 c2c4",
        )
        .unwrap();
        assert_eq!(info.multipv, Some(2));
        assert_eq!(info.score, Some(Score::Cp(-12)));
        assert_eq!(info.pv, vec!["d2d4", "d7d5", "c2c4"]);
    }

    #[test]
    fn bound_markers_do_not_shift_tokens() {
        let info =
            parse_info_line("info depth 9 multipv 1 score cp 40 lowerbound nodes 42 pv e2e4")
                .unwrap();
        assert_eq!(info.score, Some(Score::Cp(40)));
        assert_eq!(info.pv, vec!["e2e4"]);
    }

    #[test]
    fn non_info_lines_are_ignored() {
        assert!(parse_info_line("bestmove e2e4 ponder e7e5").is_none());
        assert!(parse_info_line("").is_none());
    }

    #[test]
    fn collector_keeps_latest_line_per_rank() {
        let mut c = MultipvCollector::default();
        c.update("info depth 1 multipv 1 score cp 10 pv e2e4");
        c.update("info depth 1 multipv 2 score cp 5 pv d2d4");
        c.update("info depth 2 multipv 2 score mate -4 pv g2g4");
        c.update("info depth 2 multipv 1 score cp 20 pv c2c4 e7e5");
        // スコアや PV のない行は無視
        c.update("info depth 3 currmove e2e4 currmovenumber 1");
        c.update("info string NNUE evaluation enabled");
        let lines = c.into_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].rank, 1);
        assert_eq!(lines[0].first_move(), Some("c2c4"));
        assert_eq!(lines[0].score, Score::Cp(20));
        assert_eq!(lines[1].first_move(), Some("g2g4"));
        assert_eq!(lines[1].score, Score::Mate(-4));
    }

    #[test]
    fn info_without_multipv_counts_as_first_rank() {
        let mut c = MultipvCollector::default();
        c.update("info depth 5 score cp 33 pv e2e4");
        let lines = c.into_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].rank, 1);
    }

    #[test]
    fn position_command_uses_startpos_or_fen() {
        let moves = vec!["e2e4".to_string(), "e7e5".to_string()];
        let req = EvalRequest {
            root_fen: None,
            moves: &moves,
            nodes: 1,
            multipv: 1,
            ply: 2,
        };
        assert_eq!(req.position_command(), "position startpos moves e2e4 e7e5");

        let fen = "8/8/8/8/8/8/8/K6k w - - 0 1";
        let req = EvalRequest {
            root_fen: Some(fen),
            moves: &[],
            nodes: 1,
            multipv: 1,
            ply: 0,
        };
        assert_eq!(req.position_command(), format!("position fen {fen}"));
    }
}
