use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{AppError, AppJson};
use crate::models::user::User;
use crate::session::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    username: String,
    password: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    identifier: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    token: String,
    user: User,
    expires_at: DateTime<Utc>,
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<Response, AppError> {
    let (user, token, expires_at) = state
        .auth
        .register(&body.username, body.email.as_deref(), &body.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user,
            expires_at,
        }),
    )
        .into_response())
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, token, expires_at) = state.auth.login(&body.identifier, &body.password).await?;
    Ok(Json(AuthResponse {
        token,
        user,
        expires_at,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.auth.me(&user_id).await?))
}
