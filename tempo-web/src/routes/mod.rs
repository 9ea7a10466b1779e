use axum::Router;
use axum::routing::{get, post, put};

use crate::AppState;

pub mod auth;
pub mod games;
pub mod health;

/// Routes mounted under `/api/v1`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/games", post(games::create_game))
        .route("/games/{id}", get(games::get_game).delete(games::delete_game))
        .route("/games/{id}/players", put(games::update_players))
        .route("/games/{id}/moves", post(games::post_move))
        .route("/games/{id}/undo", post(games::post_undo))
        .route("/games/{id}/board", get(games::get_board))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
}
