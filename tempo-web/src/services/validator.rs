use tokio::sync::Mutex;
use uci_engine::{EngineAdapter, EngineError};

const PROBE_SEARCH_MS: u64 = 100;

/// Outcome of the short terminal-state probe: when the side to move has
/// no legal reply, the position is mate (for the side that just moved) or
/// stalemate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalProbe {
    pub no_legal_move: bool,
    pub is_mate: bool,
}

/// The synchronous validator: a single dedicated engine instance used in
/// the request path for FEN canonicalization, move legality, and terminal
/// probes. It never contends with the pool's long-running searches.
///
/// The mutex must not be held across a pool submission.
#[derive(Debug)]
pub struct Validator {
    engine: Mutex<Option<EngineAdapter>>,
}

impl Validator {
    pub fn new(adapter: EngineAdapter) -> Validator {
        Validator {
            engine: Mutex::new(Some(adapter)),
        }
    }

    /// Reset the engine and return the canonical form of `fen` (or of the
    /// start position when absent).
    pub async fn canonicalize(&self, fen: Option<&str>) -> Result<String, EngineError> {
        let mut guard = self.engine.lock().await;
        let engine = guard.as_mut().ok_or(EngineError::ShuttingDown)?;
        engine.new_game().await?;
        engine.set_position(fen, &[]).await?;
        engine.canonical_fen().await
    }

    /// Apply `mv` to `fen` and report the resulting position. `None` means
    /// the engine left the position unchanged, i.e. the move is illegal.
    pub async fn try_move(&self, fen: &str, mv: &str) -> Result<Option<String>, EngineError> {
        let mut guard = self.engine.lock().await;
        let engine = guard.as_mut().ok_or(EngineError::ShuttingDown)?;
        engine.set_position(Some(fen), &[mv.to_string()]).await?;
        let after = engine.canonical_fen().await?;
        Ok((after != fen).then_some(after))
    }

    /// Short search to detect positions with no legal reply.
    pub async fn probe_terminal(&self, fen: &str) -> Result<TerminalProbe, EngineError> {
        let mut guard = self.engine.lock().await;
        let engine = guard.as_mut().ok_or(EngineError::ShuttingDown)?;
        engine.set_position(Some(fen), &[]).await?;
        let outcome = engine.search(PROBE_SEARCH_MS).await?;
        Ok(TerminalProbe {
            no_legal_move: outcome.best_move.is_none(),
            is_mate: outcome.is_mate,
        })
    }

    pub async fn close(&self) {
        if let Some(engine) = self.engine.lock().await.take() {
            engine.close().await;
        }
    }
}
