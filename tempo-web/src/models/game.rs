use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::player::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "w",
            Color::Black => "b",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Ongoing,
    /// An engine task is in flight for this game; mutations are rejected.
    Pending,
    /// An engine task failed; only undo or delete can leave this state.
    Stuck,
    WhiteWins,
    BlackWins,
    Draw,
    Stalemate,
}

impl GameState {
    /// Game-over states: the game finished on the board.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameState::WhiteWins | GameState::BlackWins | GameState::Draw | GameState::Stalemate
        )
    }

    /// The terminal state for "the side to move has no legal moves".
    pub fn from_probe(is_mate: bool, to_move: Color) -> GameState {
        if !is_mate {
            return GameState::Stalemate;
        }
        match to_move.opponent() {
            Color::White => GameState::WhiteWins,
            Color::Black => GameState::BlackWins,
        }
    }
}

/// One entry of a game's history: a position plus the move that produced
/// it. Element 0 is the initial position and has no move.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub fen: String,
    pub mv: Option<String>,
    /// Side to move in this position.
    pub turn: Color,
    /// Id of the player to move.
    pub player_to_move: String,
}

/// Metadata from the most recent applied move. Cleared on undo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastResult {
    #[serde(rename = "move")]
    pub mv: String,
    pub player_color: Color,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Game {
    pub id: Uuid,
    pub snapshots: Vec<Snapshot>,
    pub white: Player,
    pub black: Player,
    pub state: GameState,
    pub last_result: Option<LastResult>,
}

impl Game {
    pub fn new(id: Uuid, initial_fen: String, turn: Color, white: Player, black: Player) -> Game {
        let player_to_move = match turn {
            Color::White => white.id.clone(),
            Color::Black => black.id.clone(),
        };
        Game {
            id,
            snapshots: vec![Snapshot {
                fen: initial_fen,
                mv: None,
                turn,
                player_to_move,
            }],
            white,
            black,
            state: GameState::Ongoing,
            last_result: None,
        }
    }

    pub fn current(&self) -> &Snapshot {
        self.snapshots.last().expect("snapshot history is never empty")
    }

    pub fn move_count(&self) -> usize {
        self.snapshots.len() - 1
    }

    pub fn turn(&self) -> Color {
        self.current().turn
    }

    pub fn player(&self, color: Color) -> &Player {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn player_mut(&mut self, color: Color) -> &mut Player {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn to_move(&self) -> &Player {
        self.player(self.turn())
    }

    /// Moves applied so far, in order, as UCI strings.
    pub fn moves(&self) -> Vec<String> {
        self.snapshots.iter().filter_map(|s| s.mv.clone()).collect()
    }

    /// Append the position reached by `mv`.
    pub fn apply_move(&mut self, mv: String, fen: String, next_turn: Color) {
        let player_to_move = self.player(next_turn).id.clone();
        self.snapshots.push(Snapshot {
            fen,
            mv: Some(mv),
            turn: next_turn,
            player_to_move,
        });
    }

    /// Drop the last `count` snapshots, reset to `ongoing`, clear the last
    /// move metadata. The initial position can never be removed.
    pub fn undo(&mut self, count: usize) -> Result<(), AppError> {
        if count == 0 || count > self.move_count() {
            return Err(AppError::InvalidRequest(format!(
                "cannot undo {count} moves ({} available)",
                self.move_count()
            )));
        }
        self.snapshots.truncate(self.snapshots.len() - count);
        self.state = GameState::Ongoing;
        self.last_result = None;
        Ok(())
    }
}
