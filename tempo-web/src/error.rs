use axum::Json;
use axum::extract::FromRequest;
use axum::extract::Request;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    InvalidContentType,
    InvalidFen(String),
    InvalidMove(String),
    Unauthorized(String),
    GameNotFound,
    RateLimited,
    NotHumanTurn,
    GameOver,
    Conflict(String),
    Internal(String),
    ResourceLimit(String),
    Database(sqlx::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid-request",
            AppError::InvalidContentType => "invalid-content-type",
            AppError::InvalidFen(_) => "invalid-fen",
            AppError::InvalidMove(_) => "invalid-move",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::GameNotFound => "game-not-found",
            AppError::RateLimited => "rate-limit-exceeded",
            AppError::NotHumanTurn => "not-human-turn",
            AppError::GameOver => "game-over",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) | AppError::Database(_) => "internal-error",
            AppError::ResourceLimit(_) => "resource-limit",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_)
            | AppError::InvalidFen(_)
            | AppError::InvalidMove(_)
            | AppError::NotHumanTurn => StatusCode::BAD_REQUEST,
            AppError::InvalidContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::GameNotFound => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::GameOver | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ResourceLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::InvalidRequest(msg)
            | AppError::InvalidFen(msg)
            | AppError::InvalidMove(msg)
            | AppError::Unauthorized(msg)
            | AppError::Conflict(msg)
            | AppError::ResourceLimit(msg) => msg.clone(),
            AppError::InvalidContentType => "request body must be application/json".to_string(),
            AppError::GameNotFound => "game not found".to_string(),
            AppError::RateLimited => "rate limit exceeded".to_string(),
            AppError::NotHumanTurn => "it is not a human player's turn".to_string(),
            AppError::GameOver => "the game is over".to_string(),
            AppError::Internal(_) | AppError::Database(_) => "internal server error".to_string(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "{}: {msg}", self.code()),
            AppError::Database(e) => write!(f, "{}: {e}", self.code()),
            _ => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(msg) => tracing::error!("internal error: {msg}"),
            AppError::Database(e) => tracing::error!("database error: {e}"),
            _ => {}
        }
        let body = json!({"error": {"code": self.code(), "message": self.message()}});
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<uci_engine::EngineError> for AppError {
    fn from(e: uci_engine::EngineError) -> Self {
        AppError::Internal(e.to_string())
    }
}

/// JSON body extractor with the API's error taxonomy: a missing or wrong
/// `Content-Type` maps to `invalid-content-type`, everything else the
/// decoder rejects maps to `invalid-request`.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => Err(AppError::InvalidContentType),
            Err(rejection) => Err(AppError::InvalidRequest(rejection.body_text())),
        }
    }
}
