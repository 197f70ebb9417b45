use shakmaty::Move;

/// ルートからの指し手列と、残りの損失許容量（budget）の組。
///
/// 生成後は変更しない。子ラインは `extend` で新しく作る。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchLine {
    moves: Vec<Move>,
    budget: i32,
}

impl SearchLine {
    /// ルートライン（指し手なし）
    pub fn root(budget: i32) -> Self {
        debug_assert!(budget >= 0);
        Self {
            moves: Vec::new(),
            budget,
        }
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn budget(&self) -> i32 {
        self.budget
    }

    /// 現在の手数
    pub fn ply(&self) -> usize {
        self.moves.len()
    }

    /// `mv` を指した子ラインを作る。`loss` が budget を超える場合は枝刈りされ `None`。
    pub fn extend(&self, mv: Move, loss: i32) -> Option<SearchLine> {
        if loss > self.budget {
            return None;
        }
        let mut moves = Vec::with_capacity(self.moves.len() + 1);
        moves.extend_from_slice(&self.moves);
        moves.push(mv);
        Some(SearchLine {
            moves,
            budget: self.budget - loss,
        })
    }
}
