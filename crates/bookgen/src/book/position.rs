use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};

use super::error::BookError;

/// 探索の起点となる局面。
#[derive(Clone, Debug)]
pub struct RootPosition {
    /// 平手初期局面以外から始める場合の FEN
    fen: Option<String>,
    pos: Chess,
}

impl Default for RootPosition {
    fn default() -> Self {
        Self {
            fen: None,
            pos: Chess::default(),
        }
    }
}

impl RootPosition {
    /// `None` なら初期局面。
    pub fn from_fen(fen: Option<&str>) -> Result<Self, BookError> {
        let Some(text) = fen.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::default());
        };
        let invalid = |reason: String| BookError::InvalidRoot {
            fen: text.to_string(),
            reason,
        };
        let parsed: Fen = text.parse().map_err(|e| invalid(format!("{e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))?;
        Ok(Self {
            fen: Some(text.to_string()),
            pos,
        })
    }

    pub fn fen(&self) -> Option<&str> {
        self.fen.as_deref()
    }

    pub fn position(&self) -> &Chess {
        &self.pos
    }

    /// ルートから `moves` を指した局面を作る。
    ///
    /// `moves` はエンジン応答を `resolve_move` で検証済みのものに限る。
    pub fn replay(&self, moves: &[Move]) -> Chess {
        let mut pos = self.pos.clone();
        for mv in moves {
            pos.play_unchecked(mv);
        }
        pos
    }

    /// UCI 表記の指し手列
    pub fn uci_moves(moves: &[Move]) -> Vec<String> {
        moves.iter().map(|m| m.to_uci(CastlingMode::Standard).to_string()).collect()
    }

    /// 棋譜用の SAN 手順（`1. e4 e5 2. Nf3`）。黒番開始なら `n... ` から始める。
    pub fn movetext(&self, moves: &[Move]) -> String {
        let mut pos = self.pos.clone();
        let mut out = String::new();
        for (i, mv) in moves.iter().enumerate() {
            let number = pos.fullmoves().get();
            let turn = pos.turn();
            let san = SanPlus::from_move_and_play_unchecked(&mut pos, mv);
            if i > 0 {
                out.push(' ');
            }
            match turn {
                Color::White => out.push_str(&format!("{number}. {san}")),
                Color::Black if i == 0 => out.push_str(&format!("{number}... {san}")),
                Color::Black => out.push_str(&san.to_string()),
            }
        }
        out
    }
}

/// エンジンが返した UCI 表記の指し手を `pos` での合法手に変換する。
pub fn resolve_move(pos: &Chess, uci: &str, ply: usize) -> Result<Move, BookError> {
    let illegal = || BookError::IllegalEngineMove {
        uci: uci.to_string(),
        ply,
    };
    let parsed: UciMove = uci.parse().map_err(|_| illegal())?;
    parsed.to_move(pos).map_err(|_| illegal())
}

/// 手順違いで同じ局面に至ったかを判定するキー（手数カウンタを除いた FEN）。
pub fn transposition_key(pos: &Chess) -> String {
    let fen = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}
