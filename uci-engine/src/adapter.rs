use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use crate::error::EngineError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const READY_TIMEOUT: Duration = Duration::from_secs(5);
const FEN_TIMEOUT: Duration = Duration::from_secs(2);
const QUIT_GRACE: Duration = Duration::from_millis(100);
const KILL_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of a fixed-time search.
///
/// `best_move` is `None` when the engine reports no legal move
/// (`bestmove (none)`), which the caller interprets as mate or stalemate
/// depending on `is_mate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub best_move: Option<String>,
    pub score: i32,
    pub depth: u32,
    pub is_mate: bool,
    pub mate_in: Option<i32>,
}

/// One long-lived UCI subprocess.
///
/// The protocol is half-duplex: a command goes in on stdin, freeform lines
/// come back until a sentinel (`uciok`, `readyok`, `Fen:`, `bestmove`)
/// terminates the request. Unrecognized lines are skipped, so stale output
/// from a previous request cannot poison the next one.
///
/// Methods take `&mut self`; callers serialize access through ownership or
/// an external mutex. After any timeout the adapter is considered corrupt
/// and should be closed and discarded.
#[derive(Debug)]
pub struct EngineAdapter {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    path: PathBuf,
}

impl EngineAdapter {
    /// Spawn the engine binary and complete the `uci` handshake.
    pub async fn spawn(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let mut child = Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn(no_pipe("stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn(no_pipe("stdout")))?;

        let mut adapter = EngineAdapter {
            stdin,
            lines: BufReader::new(stdout).lines(),
            child,
            path,
        };

        adapter.send("uci").await?;
        adapter.wait_for("uciok", HANDSHAKE_TIMEOUT).await?;
        tracing::debug!(path = %adapter.path.display(), "engine ready");
        Ok(adapter)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reset the engine for a fresh game and wait until it is ready.
    pub async fn new_game(&mut self) -> Result<(), EngineError> {
        self.send("ucinewgame").await?;
        self.send("isready").await?;
        self.wait_for("readyok", READY_TIMEOUT).await
    }

    /// Load a position. `None` means the standard start position.
    /// No acknowledgement is read; the next sentinel-bearing command
    /// observes the result.
    pub async fn set_position(
        &mut self,
        fen: Option<&str>,
        moves: &[String],
    ) -> Result<(), EngineError> {
        let mut cmd = match fen {
            Some(fen) => format!("position fen {fen}"),
            None => "position startpos".to_string(),
        };
        if !moves.is_empty() {
            cmd.push_str(" moves ");
            cmd.push_str(&moves.join(" "));
        }
        self.send(&cmd).await
    }

    /// Ask the engine to dump its current position and scan for the
    /// `Fen:` line.
    pub async fn canonical_fen(&mut self) -> Result<String, EngineError> {
        self.send("d").await?;
        let scan = async {
            loop {
                let line = self.read_line().await?;
                if let Some(fen) = line.trim().strip_prefix("Fen:") {
                    return Ok(fen.trim().to_string());
                }
            }
        };
        timeout(FEN_TIMEOUT, scan)
            .await
            .map_err(|_| EngineError::Timeout("Fen: line"))?
    }

    /// Fixed-time search. Consumes `info` lines until `bestmove`, parsing
    /// depth and score along the way. Bounded by `2 * time_ms + 1000ms`.
    pub async fn search(&mut self, time_ms: u64) -> Result<SearchOutcome, EngineError> {
        self.send(&format!("go movetime {time_ms}")).await?;

        let deadline = Duration::from_millis(2 * time_ms + 1000);
        let mut outcome = SearchOutcome {
            best_move: None,
            score: 0,
            depth: 0,
            is_mate: false,
            mate_in: None,
        };

        let scan = async {
            loop {
                let line = self.read_line().await?;
                let line = line.trim();
                if line.starts_with("info ") {
                    parse_info(line, &mut outcome);
                } else if let Some(rest) = line.strip_prefix("bestmove") {
                    let token = rest.split_whitespace().next().unwrap_or("");
                    outcome.best_move = match token {
                        "" | "(none)" | "0000" => None,
                        mv => Some(mv.to_string()),
                    };
                    return Ok(());
                }
            }
        };
        timeout(deadline, scan)
            .await
            .map_err(|_| EngineError::Timeout("bestmove"))??;
        Ok(outcome)
    }

    /// Set the engine's skill level, clamped to 0..=20.
    pub async fn set_skill_level(&mut self, level: u8) -> Result<(), EngineError> {
        let level = level.min(20);
        self.send(&format!("setoption name Skill Level value {level}"))
            .await
    }

    /// Quit politely, then force-kill if the process lingers.
    pub async fn close(mut self) {
        let _ = self.send("quit").await;
        tokio::time::sleep(QUIT_GRACE).await;
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if timeout(KILL_TIMEOUT, self.child.wait()).await.is_err() {
            tracing::warn!(path = %self.path.display(), "engine ignored quit, killing");
            let _ = self.child.kill().await;
        }
    }

    async fn send(&mut self, command: &str) -> Result<(), EngineError> {
        self.stdin
            .write_all(command.as_bytes())
            .await
            .map_err(EngineError::Io)?;
        self.stdin.write_all(b"\n").await.map_err(EngineError::Io)?;
        self.stdin.flush().await.map_err(EngineError::Io)
    }

    async fn read_line(&mut self) -> Result<String, EngineError> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(EngineError::Closed),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    /// Skip lines until `token` appears on its own, bounded by `limit`.
    async fn wait_for(&mut self, token: &str, limit: Duration) -> Result<(), EngineError> {
        let scan = async {
            loop {
                if self.read_line().await?.trim() == token {
                    return Ok(());
                }
            }
        };
        timeout(limit, scan)
            .await
            .map_err(|_| EngineError::Timeout("ready sentinel"))?
    }
}

fn no_pipe(which: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("engine process has no {which} pipe"),
    )
}

fn parse_info(line: &str, outcome: &mut SearchOutcome) {
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            "depth" => {
                if let Some(d) = tokens.next().and_then(|t| t.parse().ok()) {
                    outcome.depth = d;
                }
            }
            "score" => match tokens.next() {
                Some("cp") => {
                    if let Some(cp) = tokens.next().and_then(|t| t.parse().ok()) {
                        outcome.score = cp;
                        outcome.is_mate = false;
                        outcome.mate_in = None;
                    }
                }
                Some("mate") => {
                    if let Some(n) = tokens.next().and_then(|t| t.parse().ok()) {
                        outcome.is_mate = true;
                        outcome.mate_in = Some(n);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
}
