use std::path::PathBuf;

use thiserror::Error;

/// 定跡生成で呼び出し側が区別したいエラー
#[derive(Debug, Error)]
pub enum BookError {
    #[error("invalid root position '{fen}': {reason}")]
    InvalidRoot { fen: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// エンジンが返した指し手が解釈できない、または非合法（プロトコル不整合）
    #[error("engine returned illegal move '{uci}' at ply {ply}")]
    IllegalEngineMove { uci: String, ply: usize },

    #[error("all {0} analysis workers failed")]
    AllWorkersFailed(usize),
}
