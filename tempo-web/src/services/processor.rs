use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uci_engine::{EngineError, EnginePool, SearchOutcome};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::game::{Color, Game, GameState, LastResult};
use crate::models::player::{PlayerKind, PlayerSpec};
use crate::services::storage::{Storage, WriteUnit};
use crate::services::table::GameTable;
use crate::services::validator::Validator;
use crate::services::waiters::WaitRegistry;
use crate::utils;

/// Client-to-server signal that the computer player should move now.
/// Deliberately not a legal move string.
pub const COMPUTER_MOVE_SENTINEL: &str = "cccc";
pub const MAX_UNDO_COUNT: usize = 300;
const POOL_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Process-wide id source, injected so tests can use a deterministic
/// sequence.
pub type IdGen = Arc<dyn Fn() -> Uuid + Send + Sync>;

/// Everything a client can ask the server to do with a game.
pub enum Command {
    CreateGame {
        white: PlayerSpec,
        black: PlayerSpec,
        fen: Option<String>,
        user_id: Option<String>,
    },
    ConfigurePlayers {
        game_id: Uuid,
        white: PlayerSpec,
        black: PlayerSpec,
    },
    GetGame {
        game_id: Uuid,
    },
    DeleteGame {
        game_id: Uuid,
    },
    MakeMove {
        game_id: Uuid,
        mv: String,
        user_id: Option<String>,
    },
    UndoMove {
        game_id: Uuid,
        count: usize,
    },
    GetBoard {
        game_id: Uuid,
    },
}

pub enum Outcome {
    Game(Game),
    Board { fen: String, board: String },
    Deleted,
}

/// The orchestrator: the single entry point through which every game
/// mutation flows. Owns the synchronous validator engine and the async
/// search pool; holds handles to the game table, wait registry, and
/// storage writer.
pub struct Processor {
    games: GameTable,
    waiters: WaitRegistry,
    storage: Storage,
    pool: Arc<EnginePool>,
    validator: Validator,
    ids: IdGen,
}

impl Processor {
    pub fn new(
        games: GameTable,
        waiters: WaitRegistry,
        storage: Storage,
        pool: Arc<EnginePool>,
        validator: Validator,
        ids: IdGen,
    ) -> Processor {
        Processor {
            games,
            waiters,
            storage,
            pool,
            validator,
            ids,
        }
    }

    pub fn default_ids() -> IdGen {
        Arc::new(Uuid::new_v4)
    }

    /// The game table, exposed for the long-poll read path only.
    pub fn games(&self) -> &GameTable {
        &self.games
    }

    /// The wait registry, exposed for the long-poll read path only.
    pub fn waiters(&self) -> &WaitRegistry {
        &self.waiters
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub async fn execute(self: &Arc<Self>, command: Command) -> Result<Outcome, AppError> {
        match command {
            Command::CreateGame {
                white,
                black,
                fen,
                user_id,
            } => self.create_game(white, black, fen, user_id).await,
            Command::ConfigurePlayers {
                game_id,
                white,
                black,
            } => self.configure_players(game_id, white, black).await,
            Command::GetGame { game_id } => {
                let game = self.games.get(&game_id).await.ok_or(AppError::GameNotFound)?;
                Ok(Outcome::Game(game))
            }
            Command::DeleteGame { game_id } => self.delete_game(game_id).await,
            Command::MakeMove {
                game_id,
                mv,
                user_id: _,
            } => {
                // Any caller who knows the game id may move as the side to
                // move; the token only associates created seats with a user.
                if mv == COMPUTER_MOVE_SENTINEL {
                    self.trigger_computer_move(game_id).await
                } else {
                    self.apply_human_move(game_id, mv).await
                }
            }
            Command::UndoMove { game_id, count } => self.undo_move(game_id, count).await,
            Command::GetBoard { game_id } => {
                let game = self.games.get(&game_id).await.ok_or(AppError::GameNotFound)?;
                let fen = game.current().fen.clone();
                let board = utils::render_ascii_board(&fen)?;
                Ok(Outcome::Board { fen, board })
            }
        }
    }

    /// Shut the subsystems down in dependency order. Each step is bounded
    /// and logged; none is fatal.
    pub async fn shutdown(&self) {
        self.waiters.shutdown();
        self.storage.shutdown().await;
        if let Err(e) = self.pool.shutdown(POOL_SHUTDOWN_DEADLINE).await {
            tracing::warn!("engine pool shutdown: {e}");
        }
        self.validator.close().await;
    }

    async fn create_game(
        &self,
        white: PlayerSpec,
        black: PlayerSpec,
        fen: Option<String>,
        user_id: Option<String>,
    ) -> Result<Outcome, AppError> {
        white.validate()?;
        black.validate()?;

        let fen = fen.filter(|f| !f.is_empty());
        if let Some(f) = fen.as_deref()
            && !utils::valid_fen_input(f)
        {
            return Err(AppError::InvalidFen("FEN failed the safety check".to_string()));
        }

        let supplied = fen.is_some();
        let canonical = match self.validator.canonicalize(fen.as_deref()).await {
            Ok(c) => c,
            Err(e) if supplied => {
                tracing::debug!("engine rejected supplied FEN: {e}");
                return Err(AppError::InvalidFen("the engine rejected the position".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let turn = utils::turn_from_fen(&canonical)?;

        let game_id = (self.ids)();
        let fresh = || (self.ids)();
        let white = white.into_player(Color::White, user_id.as_deref(), &fresh);
        let black = black.into_player(Color::Black, user_id.as_deref(), &fresh);
        let mut game = Game::new(game_id, canonical.clone(), turn, white.clone(), black.clone());

        // A supplied position may already be decided.
        match self.validator.probe_terminal(&canonical).await {
            Ok(probe) if probe.no_legal_move => {
                game.state = GameState::from_probe(probe.is_mate, turn);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(game = %game_id, "terminal probe failed at create: {e}");
                game.state = GameState::Stuck;
            }
        }

        self.games.insert(game.clone()).await;
        self.storage.enqueue(WriteUnit::InsertGame {
            game_id,
            initial_fen: canonical,
            white,
            black,
            start_time: Utc::now(),
        });
        tracing::info!(game = %game_id, state = ?game.state, "game created");
        Ok(Outcome::Game(game))
    }

    async fn configure_players(
        &self,
        game_id: Uuid,
        white: PlayerSpec,
        black: PlayerSpec,
    ) -> Result<Outcome, AppError> {
        white.validate()?;
        black.validate()?;
        self.games
            .with_game_mut(&game_id, |g| {
                if g.state == GameState::Pending {
                    return Err(AppError::InvalidRequest(
                        "an engine move is in progress".to_string(),
                    ));
                }
                white.apply_to(&mut g.white);
                black.apply_to(&mut g.black);
                Ok(())
            })
            .await
            .ok_or(AppError::GameNotFound)??;

        let game = self.games.get(&game_id).await.ok_or(AppError::GameNotFound)?;
        Ok(Outcome::Game(game))
    }

    async fn delete_game(&self, game_id: Uuid) -> Result<Outcome, AppError> {
        self.games
            .remove_if(&game_id, |g| {
                if g.state == GameState::Pending {
                    Err(AppError::InvalidRequest(
                        "cannot delete while an engine move is in progress".to_string(),
                    ))
                } else {
                    Ok(())
                }
            })
            .await
            .ok_or(AppError::GameNotFound)??;

        self.waiters.remove_game(&game_id);
        self.storage.enqueue(WriteUnit::DeleteGame { game_id });
        tracing::info!(game = %game_id, "game deleted");
        Ok(Outcome::Deleted)
    }

    async fn undo_move(&self, game_id: Uuid, count: usize) -> Result<Outcome, AppError> {
        if count == 0 || count > MAX_UNDO_COUNT {
            return Err(AppError::InvalidRequest(format!(
                "count must be between 1 and {MAX_UNDO_COUNT}"
            )));
        }

        let remaining = self
            .games
            .with_game_mut(&game_id, |g| {
                if g.state == GameState::Pending {
                    return Err(AppError::InvalidRequest(
                        "an engine move is in progress".to_string(),
                    ));
                }
                g.undo(count)?;
                let remaining = g.move_count();
                self.waiters.notify_game(&game_id, remaining);
                Ok(remaining)
            })
            .await
            .ok_or(AppError::GameNotFound)??;

        self.storage.enqueue(WriteUnit::DeleteMovesAfter {
            game_id,
            keep: remaining as i64,
        });

        let game = self.games.get(&game_id).await.ok_or(AppError::GameNotFound)?;
        Ok(Outcome::Game(game))
    }

    async fn apply_human_move(
        self: &Arc<Self>,
        game_id: Uuid,
        mv: String,
    ) -> Result<Outcome, AppError> {
        if !utils::valid_move_format(&mv) {
            return Err(AppError::InvalidMove(format!("malformed move: {mv}")));
        }

        let game = self.games.get(&game_id).await.ok_or(AppError::GameNotFound)?;
        require_ongoing(game.state)?;
        if game.to_move().kind != PlayerKind::Human {
            return Err(AppError::NotHumanTurn);
        }
        let pre_fen = game.current().fen.clone();
        let mover = game.turn();

        // Legality by position comparison: the engine leaves the position
        // untouched when asked to play an illegal move.
        let new_fen = self
            .validator
            .try_move(&pre_fen, &mv)
            .await?
            .ok_or_else(|| AppError::InvalidMove(format!("illegal move: {mv}")))?;
        let next_turn = utils::turn_from_fen(&new_fen)?;

        let move_number = self
            .games
            .with_game_mut(&game_id, |g| {
                // The validator ran outside the lock; bail if the game
                // moved on underneath it.
                if g.state != GameState::Ongoing || g.current().fen != pre_fen {
                    return Err(AppError::InvalidMove(
                        "the position changed while validating".to_string(),
                    ));
                }
                g.apply_move(mv.clone(), new_fen.clone(), next_turn);
                g.last_result = Some(LastResult {
                    mv: mv.clone(),
                    player_color: mover,
                    score: None,
                    depth: None,
                });
                let count = g.move_count();
                self.waiters.notify_game(&game_id, count);
                Ok(count)
            })
            .await
            .ok_or(AppError::GameNotFound)??;

        self.storage.enqueue(WriteUnit::InsertMove {
            game_id,
            move_number: move_number as i64,
            move_uci: mv,
            fen_after: new_fen.clone(),
            color: mover,
            at: Utc::now(),
        });

        self.run_terminal_probe(game_id, &new_fen, move_number).await;

        let game = self.games.get(&game_id).await.ok_or(AppError::GameNotFound)?;
        Ok(Outcome::Game(game))
    }

    /// `ongoing -> pending` plus a pool submission. The response returns
    /// immediately; the completion callback finishes the move.
    async fn trigger_computer_move(self: &Arc<Self>, game_id: Uuid) -> Result<Outcome, AppError> {
        let (fen, seat, snapshot) = self
            .games
            .with_game_mut(&game_id, |g| {
                let seat = g.to_move().clone();
                if seat.kind != PlayerKind::Computer {
                    return Err(AppError::InvalidMove(
                        "the computer is not to move".to_string(),
                    ));
                }
                require_ongoing(g.state)?;
                g.state = GameState::Pending;
                self.waiters.notify_game(&game_id, g.move_count());
                Ok((g.current().fen.clone(), seat, g.clone()))
            })
            .await
            .ok_or(AppError::GameNotFound)??;

        let processor = Arc::clone(self);
        let submitted = self.pool.submit_with_deadline(
            fen,
            seat.level,
            seat.search_time_ms,
            move |result| {
                tokio::spawn(async move {
                    processor.complete_computer_move(game_id, result).await;
                });
            },
        );

        if let Err(e) = submitted {
            // Roll the transition back so the game is not wedged.
            self.games
                .with_game_mut(&game_id, |g| {
                    if g.state == GameState::Pending {
                        g.state = GameState::Ongoing;
                        self.waiters.notify_game(&game_id, g.move_count());
                    }
                })
                .await;
            return Err(match e {
                EngineError::QueueFull => {
                    AppError::ResourceLimit("engine queue is full".to_string())
                }
                EngineError::ShuttingDown => {
                    AppError::ResourceLimit("server is shutting down".to_string())
                }
                other => AppError::Internal(other.to_string()),
            });
        }

        // Answer with the state captured at the transition; a fast engine
        // may already have completed the move by now.
        Ok(Outcome::Game(snapshot))
    }

    /// Runs when the pool delivers (or the watchdog gives up on) a
    /// computer move. The game may have been deleted or undone out of
    /// `pending` in the meantime; then the result is discarded.
    async fn complete_computer_move(
        self: Arc<Self>,
        game_id: Uuid,
        result: Result<SearchOutcome, EngineError>,
    ) {
        let Some(game) = self.games.get(&game_id).await else {
            tracing::debug!(game = %game_id, "computer move for a deleted game, discarding");
            return;
        };
        if game.state != GameState::Pending {
            tracing::debug!(game = %game_id, "computer move for a non-pending game, discarding");
            return;
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(game = %game_id, "engine task failed: {e}");
                self.mark_stuck(game_id).await;
                return;
            }
        };

        let Some(mv) = outcome.best_move.clone() else {
            // The computer has no legal reply: the previous move decided
            // the game.
            self.games
                .with_game_mut(&game_id, |g| {
                    if g.state == GameState::Pending {
                        g.state = GameState::from_probe(outcome.is_mate, g.turn());
                        self.waiters.notify_game(&game_id, g.move_count());
                    }
                })
                .await;
            return;
        };

        // Apply through the validator; the engine is trusted, the
        // validator just computes the resulting position.
        let pre_fen = game.current().fen.clone();
        let mover = game.turn();
        let new_fen = match self.validator.try_move(&pre_fen, &mv).await {
            Ok(Some(fen)) => fen,
            Ok(None) => {
                tracing::warn!(game = %game_id, "validator rejected engine move {mv}");
                self.mark_stuck(game_id).await;
                return;
            }
            Err(e) => {
                tracing::warn!(game = %game_id, "validator failed on engine move: {e}");
                self.mark_stuck(game_id).await;
                return;
            }
        };
        let next_turn = match utils::turn_from_fen(&new_fen) {
            Ok(turn) => turn,
            Err(e) => {
                tracing::warn!(game = %game_id, "{e}");
                self.mark_stuck(game_id).await;
                return;
            }
        };

        let committed = self
            .games
            .with_game_mut(&game_id, |g| {
                if g.state != GameState::Pending || g.current().fen != pre_fen {
                    return None;
                }
                g.apply_move(mv.clone(), new_fen.clone(), next_turn);
                g.state = GameState::Ongoing;
                g.last_result = Some(LastResult {
                    mv: mv.clone(),
                    player_color: mover,
                    score: Some(outcome.score),
                    depth: Some(outcome.depth),
                });
                let count = g.move_count();
                self.waiters.notify_game(&game_id, count);
                Some(count)
            })
            .await
            .flatten();

        let Some(move_number) = committed else { return };
        self.storage.enqueue(WriteUnit::InsertMove {
            game_id,
            move_number: move_number as i64,
            move_uci: mv,
            fen_after: new_fen.clone(),
            color: mover,
            at: Utc::now(),
        });
        self.run_terminal_probe(game_id, &new_fen, move_number).await;
    }

    async fn mark_stuck(&self, game_id: Uuid) {
        self.games
            .with_game_mut(&game_id, |g| {
                if g.state == GameState::Pending {
                    g.state = GameState::Stuck;
                    self.waiters.notify_game(&game_id, g.move_count());
                }
            })
            .await;
    }

    /// After a move lands, check whether the opponent has any legal reply;
    /// if not the game ends here. The state is only touched if the game
    /// has not moved on since `expected_count`.
    async fn run_terminal_probe(&self, game_id: Uuid, fen: &str, expected_count: usize) {
        match self.validator.probe_terminal(fen).await {
            Ok(probe) if probe.no_legal_move => {
                self.games
                    .with_game_mut(&game_id, |g| {
                        if g.state == GameState::Ongoing && g.move_count() == expected_count {
                            g.state = GameState::from_probe(probe.is_mate, g.turn());
                            self.waiters.notify_game(&game_id, g.move_count());
                        }
                    })
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(game = %game_id, "terminal probe failed: {e}");
                self.games
                    .with_game_mut(&game_id, |g| {
                        if g.state == GameState::Ongoing && g.move_count() == expected_count {
                            g.state = GameState::Stuck;
                            self.waiters.notify_game(&game_id, g.move_count());
                        }
                    })
                    .await;
            }
        }
    }
}

fn require_ongoing(state: GameState) -> Result<(), AppError> {
    match state {
        GameState::Ongoing => Ok(()),
        GameState::Pending => Err(AppError::InvalidRequest(
            "an engine move is in progress".to_string(),
        )),
        GameState::Stuck => Err(AppError::InvalidRequest(
            "the game is stuck; undo to recover".to_string(),
        )),
        GameState::WhiteWins | GameState::BlackWins | GameState::Draw | GameState::Stalemate => {
            Err(AppError::GameOver)
        }
    }
}
