use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppJson};
use crate::models::game::{Color, Game, GameState, LastResult};
use crate::models::player::{Player, PlayerSpec};
use crate::services::processor::{Command, MAX_UNDO_COUNT, Outcome};
use crate::session::MaybeAuthUser;

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResponse {
    pub game_id: Uuid,
    pub fen: String,
    pub turn: Color,
    pub state: GameState,
    pub moves: Vec<String>,
    pub players: PlayersResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_move: Option<LastResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayersResponse {
    pub white: Player,
    pub black: Player,
}

#[derive(Debug, Serialize)]
pub struct BoardResponse {
    pub fen: String,
    pub board: String,
}

pub fn build_game_response(game: &Game) -> GameResponse {
    GameResponse {
        game_id: game.id,
        fen: game.current().fen.clone(),
        turn: game.turn(),
        state: game.state,
        moves: game.moves(),
        players: PlayersResponse {
            white: game.white.clone(),
            black: game.black.clone(),
        },
        last_move: game.last_result.clone(),
        pending: (game.state == GameState::Pending).then_some(true),
    }
}

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateGameRequest {
    white: PlayerSpec,
    black: PlayerSpec,
    #[serde(default)]
    fen: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PlayersRequest {
    white: PlayerSpec,
    black: PlayerSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveRequest {
    #[serde(rename = "move")]
    mv: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UndoRequest {
    count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetGameQuery {
    #[serde(default)]
    wait: Option<bool>,
    #[serde(default)]
    move_count: Option<usize>,
}

fn parse_game_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::InvalidRequest("game id must be a UUID".to_string()))
}

fn game_json(outcome: Outcome) -> Result<Json<GameResponse>, AppError> {
    match outcome {
        Outcome::Game(game) => Ok(Json(build_game_response(&game))),
        _ => Err(AppError::Internal("unexpected processor outcome".to_string())),
    }
}

// -- Handlers --

pub async fn create_game(
    State(state): State<AppState>,
    MaybeAuthUser(user_id): MaybeAuthUser,
    AppJson(body): AppJson<CreateGameRequest>,
) -> Result<Response, AppError> {
    let outcome = state
        .processor
        .execute(Command::CreateGame {
            white: body.white,
            black: body.black,
            fen: body.fen,
            user_id,
        })
        .await?;
    Ok((StatusCode::CREATED, game_json(outcome)?).into_response())
}

/// Plain read, or a long-poll when `wait=true&moveCount=N`: the request
/// suspends until the game changes, the 25s cap, or client disconnect.
pub async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GetGameQuery>,
) -> Result<Json<GameResponse>, AppError> {
    let game_id = parse_game_id(&id)?;
    let games = state.processor.games();
    let game = games.get(&game_id).await.ok_or(AppError::GameNotFound)?;

    if query.wait == Some(true)
        && let Some(last_known) = query.move_count
    {
        let ticket = state.processor.waiters().register(game_id, last_known);
        // Re-check after registering: if the move count already advanced
        // the notify may have predated us, so answer immediately.
        let current = games.get(&game_id).await.ok_or(AppError::GameNotFound)?;
        if current.move_count() == last_known {
            ticket.wait().await;
        }
        let game = games.get(&game_id).await.ok_or(AppError::GameNotFound)?;
        return Ok(Json(build_game_response(&game)));
    }

    Ok(Json(build_game_response(&game)))
}

pub async fn delete_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let game_id = parse_game_id(&id)?;
    state.processor.execute(Command::DeleteGame { game_id }).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn update_players(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(body): AppJson<PlayersRequest>,
) -> Result<Json<GameResponse>, AppError> {
    let game_id = parse_game_id(&id)?;
    let outcome = state
        .processor
        .execute(Command::ConfigurePlayers {
            game_id,
            white: body.white,
            black: body.black,
        })
        .await?;
    game_json(outcome)
}

pub async fn post_move(
    State(state): State<AppState>,
    MaybeAuthUser(user_id): MaybeAuthUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<MoveRequest>,
) -> Result<Json<GameResponse>, AppError> {
    let game_id = parse_game_id(&id)?;
    let outcome = state
        .processor
        .execute(Command::MakeMove {
            game_id,
            mv: body.mv,
            user_id,
        })
        .await?;
    game_json(outcome)
}

pub async fn post_undo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(body): AppJson<UndoRequest>,
) -> Result<Json<GameResponse>, AppError> {
    let game_id = parse_game_id(&id)?;
    if body.count == 0 || body.count > MAX_UNDO_COUNT {
        return Err(AppError::InvalidRequest(format!(
            "count must be between 1 and {MAX_UNDO_COUNT}"
        )));
    }
    let outcome = state
        .processor
        .execute(Command::UndoMove {
            game_id,
            count: body.count,
        })
        .await?;
    game_json(outcome)
}

pub async fn get_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BoardResponse>, AppError> {
    let game_id = parse_game_id(&id)?;
    match state.processor.execute(Command::GetBoard { game_id }).await? {
        Outcome::Board { fen, board } => Ok(Json(BoardResponse { fen, board })),
        _ => Err(AppError::Internal("unexpected processor outcome".to_string())),
    }
}
