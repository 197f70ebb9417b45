//! 定跡生成の設定
//!
//! 既定値 → TOML ファイル → コマンドライン の順に上書きされる。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::BookError;

/// multipv 本数のスケジュール。浅い手数ほど広く、深い手数ほど狭く読む。
///
/// `K = max(min, floor(scale / (ply + 1)^exponent))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreadthSchedule {
    pub min: usize,
    pub scale: f64,
    pub exponent: f64,
}

impl Default for BreadthSchedule {
    fn default() -> Self {
        Self {
            min: 4,
            scale: 20.0,
            exponent: 0.4,
        }
    }
}

impl BreadthSchedule {
    pub fn breadth_for_ply(&self, ply: usize) -> usize {
        let width = self.scale / ((ply + 1) as f64).powf(self.exponent);
        // NaN / 負値は 0 に丸められる
        (width as usize).max(self.min)
    }
}

/// 探索全体の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookConfig {
    /// ルートラインの損失許容量 (cp)
    pub initial_budget: i32,
    /// 手数の上限 (ply)
    pub max_depth: usize,
    /// 1局面あたりのノード数
    pub nodes: u64,
    /// ワーカー数（= エンジンプロセス数）
    pub workers: usize,
    /// エンジンの Hash (MiB)。None / 0 はエンジン既定値
    pub hash_mb: Option<u32>,
    pub breadth: BreadthSchedule,
    /// 待機中ワーカーがフロンティアを覗く間隔
    pub poll_interval_ms: u64,
    /// 結果回収と進捗表示の間隔
    pub report_interval_ms: u64,
    /// 別の手順で既に展開した局面を再展開しない
    pub skip_transpositions: bool,
    /// ルート局面（None なら初期局面）
    pub root_fen: Option<String>,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            initial_budget: 50,
            max_depth: 8,
            nodes: 1_000_000,
            workers: 1,
            hash_mb: None,
            breadth: BreadthSchedule::default(),
            poll_interval_ms: 1000,
            report_interval_ms: 1000,
            skip_transpositions: false,
            root_fen: None,
        }
    }
}

impl BookConfig {
    /// TOML ファイルから読み込む。書かれていない項目は既定値。
    pub fn from_toml_file(path: &Path) -> Result<Self, BookError> {
        let text = std::fs::read_to_string(path).map_err(|source| BookError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| BookError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), BookError> {
        if self.initial_budget < 0 {
            return Err(BookError::InvalidConfig(format!(
                "initial_budget must be >= 0 (got {})",
                self.initial_budget
            )));
        }
        if self.nodes == 0 {
            return Err(BookError::InvalidConfig("nodes must be >= 1".to_string()));
        }
        if self.workers == 0 {
            return Err(BookError::InvalidConfig("workers must be >= 1".to_string()));
        }
        if self.breadth.min == 0 {
            return Err(BookError::InvalidConfig("breadth.min must be >= 1".to_string()));
        }
        if !self.breadth.scale.is_finite() || !self.breadth.exponent.is_finite() {
            return Err(BookError::InvalidConfig(
                "breadth.scale and breadth.exponent must be finite".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 || self.report_interval_ms == 0 {
            return Err(BookError::InvalidConfig(
                "poll_interval_ms and report_interval_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
