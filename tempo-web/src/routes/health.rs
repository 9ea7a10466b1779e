use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;
use crate::services::storage::StorageHealth;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    time: DateTime<Utc>,
    storage: StorageHealth,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now(),
        storage: state.processor.storage().health(),
    })
}
