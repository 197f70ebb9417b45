/// エンジン検証済みの定跡を生成する。
///
/// 初期局面から、各手の評価損を許容量（`--cp-threshold`）から差し引きながら
/// 最良優先で手順を伸ばし、採用した手順をすべて PGN に書き出す。
///
/// # 使用例
///
/// ```shell
/// cargo run -p bookgen --release -- \
///   --plies 10 --threads 8 --cp-threshold 40 --nodes 2000000 --hash 256 \
///   /usr/local/bin/stockfish book.pgn
/// ```
///
/// 設定ファイルとの併用（コマンドラインの指定が優先される）:
/// ```shell
/// cargo run -p bookgen --release -- --config book.toml --summary-out summary.json \
///   /usr/local/bin/stockfish book.pgn.gz
/// ```
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser as _;

use bookgen::book::{generate_book, BookConfig, PgnWriter, RootPosition};
use bookgen::common::io::open_writer;
use bookgen::engine::EngineConfig;

#[derive(clap::Parser, Debug)]
#[command(about = "Generate an engine-vetted opening book (PGN) by budgeted best-first search")]
struct Cli {
    /// UCI engine binary
    engine: PathBuf,

    /// Output PGN file ("-" for stdout, ".gz" for gzip)
    output: PathBuf,

    /// Maximum line length in plies [default: 8]
    #[arg(short = 'p', long)]
    plies: Option<usize>,

    /// Number of workers, one engine process each [default: 1]
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Total evaluation loss allowed along a line (cp) [default: 50]
    #[arg(short = 'c', long)]
    cp_threshold: Option<i32>,

    /// Engine Hash size in MiB (0 = engine default)
    #[arg(short = 'x', long)]
    hash: Option<u32>,

    /// Nodes searched per position [default: 1000000]
    #[arg(short = 'n', long)]
    nodes: Option<u64>,

    /// TOML config file (command-line flags take precedence)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root position in FEN (default: standard start position)
    #[arg(long)]
    fen: Option<String>,

    /// Extra arguments passed to the engine process
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    engine_args: Option<Vec<String>>,

    /// Additional UCI options (format: "Name=Value", can be repeated)
    #[arg(long = "uci-option", num_args = 1)]
    uci_options: Vec<String>,

    /// Threads option per engine
    #[arg(long)]
    engine_threads: Option<usize>,

    /// Seconds without any engine output before the engine is considered hung
    #[arg(long, default_value_t = 300)]
    engine_timeout_secs: u64,

    /// Do not expand a position already reached through another move order
    #[arg(long)]
    skip_transpositions: bool,

    /// Idle worker polling interval (ms)
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Progress report interval (ms)
    #[arg(long)]
    report_interval_ms: Option<u64>,

    /// Append to the output instead of truncating it
    #[arg(long)]
    append: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

impl Cli {
    /// 既定値 → 設定ファイル → コマンドラインの順に重ねる。
    fn book_config(&self) -> Result<BookConfig> {
        let mut cfg = match &self.config {
            Some(path) => BookConfig::from_toml_file(path)?,
            None => BookConfig::default(),
        };
        if let Some(v) = self.plies {
            cfg.max_depth = v;
        }
        if let Some(v) = self.threads {
            cfg.workers = v;
        }
        if let Some(v) = self.cp_threshold {
            cfg.initial_budget = v;
        }
        if let Some(v) = self.hash {
            cfg.hash_mb = Some(v);
        }
        if let Some(v) = self.nodes {
            cfg.nodes = v;
        }
        if let Some(v) = self.poll_interval_ms {
            cfg.poll_interval_ms = v;
        }
        if let Some(v) = self.report_interval_ms {
            cfg.report_interval_ms = v;
        }
        if self.fen.is_some() {
            cfg.root_fen = self.fen.clone();
        }
        cfg.skip_transpositions |= self.skip_transpositions;
        cfg.validate()?;
        Ok(cfg)
    }

    fn engine_config(&self, book: &BookConfig) -> EngineConfig {
        let mut cfg = EngineConfig::new(&self.engine);
        cfg.args = self.engine_args.clone().unwrap_or_default();
        cfg.threads = self.engine_threads;
        cfg.hash_mb = book.hash_mb.filter(|&mb| mb > 0);
        cfg.uci_options = self.uci_options.clone();
        cfg.response_timeout = Duration::from_secs(self.engine_timeout_secs.max(1));
        cfg
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.book_config()?;
    let root = RootPosition::from_fen(cfg.root_fen.as_deref())?;
    let engine = cli.engine_config(&cfg);

    let out = open_writer(&cli.output, cli.append)
        .with_context(|| format!("failed to open {}", cli.output.display()))?;
    let mut pgn = PgnWriter::new(out, root.clone());
    let result = generate_book(&cfg, &root, &engine, &mut pgn);
    // 失敗時も書き出し済みの分は閉じて残す
    pgn.into_inner()
        .close()
        .with_context(|| format!("failed to close {}", cli.output.display()))?;
    let summary = result?;

    if let Some(path) = &cli.summary_out {
        let mut w = open_writer(path, false)
            .with_context(|| format!("failed to open {}", path.display()))?;
        serde_json::to_writer_pretty(&mut w, &summary)?;
        std::io::Write::write_all(&mut w, b"\n")?;
        w.close().with_context(|| format!("failed to close {}", path.display()))?;
        log::info!("summary written to {}", path.display());
    }
    Ok(())
}
