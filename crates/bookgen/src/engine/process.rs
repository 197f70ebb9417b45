use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

use super::types::{EvalRequest, MultipvCollector, PvLine};

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// ノード数指定の探索で1行も返ってこない場合に応答なしとみなすまでの時間
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

/// エンジンプロセス起動時の設定。
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Threads オプション（None ならエンジンの既定値）
    pub threads: Option<usize>,
    /// Hash オプション (MiB)
    pub hash_mb: Option<u32>,
    /// 追加のUCIオプション (Name=Value 形式)
    pub uci_options: Vec<String>,
    pub response_timeout: Duration,
}

impl EngineConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            threads: None,
            hash_mb: None,
            uci_options: Vec::new(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// 1本の UCI エンジンに対する入出力をカプセル化する。
///
/// drop 時に `quit` を送り、一定時間内に終了しなければ kill する。
pub struct UciEngine {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    opt_names: HashSet<String>,
    multipv: usize,
    response_timeout: Duration,
    pub label: String,
}

impl UciEngine {
    pub fn spawn(cfg: &EngineConfig, label: String) -> Result<Self> {
        let mut cmd = Command::new(&cfg.path);
        if !cfg.args.is_empty() {
            cmd.args(&cfg.args);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn engine at {}", cfg.path.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut engine = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            opt_names: HashSet::new(),
            multipv: 1,
            response_timeout: cfg.response_timeout,
            label,
        };
        engine.initialize(cfg)?;
        Ok(engine)
    }

    fn initialize(&mut self, cfg: &EngineConfig) -> Result<()> {
        self.write_line("uci")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = parse_option_name(rest) {
                    self.opt_names.insert(name);
                }
            } else if line == "uciok" {
                break;
            }
        }
        if let Some(threads) = cfg.threads {
            self.set_option_if_available("Threads", &threads.to_string())?;
        }
        if let Some(hash) = cfg.hash_mb.filter(|&mb| mb > 0) {
            self.set_option_if_available("Hash", &hash.to_string())?;
        }
        for opt in &cfg.uci_options {
            if let Some((name, value)) = opt.split_once('=') {
                self.set_option_if_available(name.trim(), value.trim())?;
            } else {
                // "=" がない場合はボタン型オプションとみなし、値なしで送る
                self.write_line(&format!("setoption name {}", opt.trim()))?;
            }
        }
        self.sync_ready()?;
        log::debug!("{}: ready ({} options advertised)", self.label, self.opt_names.len());
        Ok(())
    }

    /// 1局面を解析し、multipv の各ラインを rank 順で返す。
    ///
    /// 局面ごとに `ucinewgame` を送り、前の局面の探索状態を持ち越さない。
    pub fn analyse(&mut self, req: &EvalRequest<'_>) -> Result<Vec<PvLine>> {
        self.write_line("ucinewgame")?;
        self.sync_ready()?;
        if self.multipv != req.multipv {
            self.set_option_if_available("MultiPV", &req.multipv.to_string())?;
            self.multipv = req.multipv;
        }
        self.write_line(&req.position_command())?;
        self.write_line(&format!("go nodes {}", req.nodes))?;

        let start = Instant::now();
        let mut collector = MultipvCollector::default();
        loop {
            let line = self.recv_line(self.response_timeout)?;
            if line.starts_with("info") {
                collector.update(&line);
                continue;
            }
            if line.starts_with("bestmove") {
                break;
            }
        }
        let lines = collector.into_lines();
        log::debug!(
            "{}: ply {} multipv {} -> {} lines in {:?}",
            self.label,
            req.ply,
            req.multipv,
            lines.len(),
            start.elapsed()
        );
        Ok(lines)
    }

    pub fn sync_ready(&mut self) -> Result<()> {
        self.write_line("isready")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if line == "readyok" {
                break;
            }
        }
        Ok(())
    }

    pub fn recv_line(&self, timeout: Duration) -> Result<String> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => {
                log::debug!("{} > {}", self.label, line);
                Ok(line)
            }
            Err(RecvTimeoutError::Timeout) => {
                bail!("{}: engine read timeout ({:?})", self.label, timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                bail!("{}: engine exited unexpectedly", self.label)
            }
        }
    }

    pub fn set_option_if_available(&mut self, name: &str, value: &str) -> Result<()> {
        if self.opt_names.is_empty() || self.opt_names.contains(name) {
            self.write_line(&format!("setoption name {} value {}", name, value))?;
        } else {
            log::warn!("{}: engine does not advertise option {name}, skipped", self.label);
        }
        Ok(())
    }

    pub fn write_line(&mut self, msg: &str) -> Result<()> {
        log::debug!("{} < {}", self.label, msg);
        self.stdin
            .write_all(msg.as_bytes())
            .and_then(|_| self.stdin.write_all(b"\n"))
            .and_then(|_| self.stdin.flush())
            .with_context(|| format!("{}: failed to write to engine stdin", self.label))
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            std::thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// `option name <NAME...> type ...` から名前部分を取り出す。
pub fn parse_option_name(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    while let Some(tok) = tokens.next() {
        if tok == "name" {
            let parts: Vec<&str> = tokens.by_ref().take_while(|t| *t != "type").collect();
            if !parts.is_empty() {
                return Some(parts.join(" "));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_names_may_contain_spaces() {
        assert_eq!(
            parse_option_name("name Hash type spin default 16 min 1 max 33554432"),
            Some("Hash".to_string())
        );
        assert_eq!(
            parse_option_name("name Clear Hash type button"),
            Some("Clear Hash".to_string())
        );
        assert_eq!(parse_option_name("type check default false"), None);
    }

    /// 受け取ったコマンドを `$1` に記録し、`$2` の動作モードで応答する UCI エンジン。
    /// - `normal`: 固定の multipv info を返して bestmove
    /// - `hang`: go に何も返さない
    /// - `crash`: go で終了する
    #[cfg(unix)]
    const SCRIPTED_ENGINE: &str = r#"log="$1"
mode="$2"
while IFS= read -r cmd; do
  echo "$cmd" >> "$log"
  case "$cmd" in
    uci)
      echo "id name scripted"
      echo "option name Hash type spin default 16 min 1 max 1024"
      echo "option name MultiPV type spin default 1 min 1 max 500"
      echo "uciok"
      ;;
    isready)
      echo "readyok"
      ;;
    go*)
      if [ "$mode" = hang ]; then continue; fi
      if [ "$mode" = crash ]; then exit 1; fi
      echo "info depth 1 multipv 1 score cp 10 pv e2e4"
      echo "info depth 1 multipv 2 score cp 3 pv d2d4"
      echo "info depth 2 multipv 2 score cp -5 nodes 900 pv g1f3 g8f6"
      echo "info depth 2 multipv 1 score mate 3 nodes 900 pv e2e4 e7e5"
      echo "info string search finished"
      echo "bestmove e2e4 ponder e7e5"
      ;;
    quit)
      exit 0
      ;;
  esac
done
"#;

    #[cfg(unix)]
    struct ScriptedEngine {
        _dir: tempfile::TempDir,
        transcript: PathBuf,
        cfg: EngineConfig,
    }

    #[cfg(unix)]
    fn scripted_engine(mode: &str) -> ScriptedEngine {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, SCRIPTED_ENGINE).unwrap();
        let transcript = dir.path().join("transcript.log");
        let mut cfg = EngineConfig::new("/bin/sh");
        cfg.args = vec![
            script.display().to_string(),
            transcript.display().to_string(),
            mode.to_string(),
        ];
        ScriptedEngine {
            _dir: dir,
            transcript,
            cfg,
        }
    }

    #[cfg(unix)]
    fn read_transcript(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| *l != "quit")
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn session_sends_expected_commands_and_collects_multipv() {
        use crate::engine::{EngineSession, Score};

        let mut engine = scripted_engine("normal");
        engine.cfg.threads = Some(2);
        engine.cfg.hash_mb = Some(64);
        engine.cfg.uci_options = vec!["Contempt=0".to_string()];
        let mut session = UciEngine::spawn(&engine.cfg, "engine#0".to_string()).unwrap();

        let moves = vec!["e2e4".to_string()];
        let req = EvalRequest {
            root_fen: None,
            moves: &moves,
            nodes: 1000,
            multipv: 3,
            ply: 1,
        };
        let lines = session.analyse(&req).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].rank, 1);
        assert_eq!(lines[0].score, Score::Mate(3));
        assert_eq!(lines[0].pv, vec!["e2e4", "e7e5"]);
        assert_eq!(lines[1].rank, 2);
        assert_eq!(lines[1].score, Score::Cp(-5));
        assert_eq!(lines[1].first_move(), Some("g1f3"));

        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let req = EvalRequest {
            root_fen: Some(fen),
            moves: &[],
            nodes: 1000,
            multipv: 3,
            ply: 0,
        };
        let candidates = session.evaluate(&req).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].uci, "e2e4");
        assert_eq!(candidates[1].uci, "g1f3");
        drop(session);

        // Threads と Contempt は広告されていないので送らない。MultiPV は幅が変わったときだけ
        let fen_cmd = format!("position fen {fen}");
        let expected: [&str; 12] = [
            "uci",
            "setoption name Hash value 64",
            "isready",
            "ucinewgame",
            "isready",
            "setoption name MultiPV value 3",
            "position startpos moves e2e4",
            "go nodes 1000",
            "ucinewgame",
            "isready",
            fen_cmd.as_str(),
            "go nodes 1000",
        ];
        assert_eq!(read_transcript(&engine.transcript), expected);
    }

    #[cfg(unix)]
    #[test]
    fn unresponsive_engine_fails_after_response_timeout() {
        let mut engine = scripted_engine("hang");
        engine.cfg.response_timeout = Duration::from_millis(200);
        let mut session = UciEngine::spawn(&engine.cfg, "engine#1".to_string()).unwrap();
        let req = EvalRequest {
            root_fen: None,
            moves: &[],
            nodes: 1000,
            multipv: 4,
            ply: 0,
        };
        let start = Instant::now();
        let err = session.analyse(&req).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(format!("{err:#}").contains("engine read timeout"));
    }

    #[cfg(unix)]
    #[test]
    fn engine_exiting_mid_search_is_a_session_error() {
        let engine = scripted_engine("crash");
        let mut session = UciEngine::spawn(&engine.cfg, "engine#2".to_string()).unwrap();
        let req = EvalRequest {
            root_fen: None,
            moves: &[],
            nodes: 1000,
            multipv: 4,
            ply: 0,
        };
        let err = session.analyse(&req).unwrap_err();
        assert!(format!("{err:#}").contains("engine exited unexpectedly"));
    }

    #[test]
    fn spawning_a_missing_binary_fails_with_path_in_message() {
        let cfg = EngineConfig::new("/nonexistent/bookgen-test-engine");
        let err = UciEngine::spawn(&cfg, "engine#0".to_string()).err().unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/bookgen-test-engine"));
    }
}
