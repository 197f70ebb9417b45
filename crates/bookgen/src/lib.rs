//! エンジン検証済みの定跡（opening book）生成ツール
//!
//! - `book`: 探索ライン・フロンティア・終了検出・ワーカー・結果回収・PGN 出力
//! - `engine`: UCI エンジンプロセスとの対話、info 行の解析
//! - `common`: 出力ファイルユーティリティ（gzip対応）

pub mod book;
pub mod common;
pub mod engine;
