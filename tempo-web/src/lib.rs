use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod routes;
pub mod services;
pub mod session;
pub mod utils;

use crate::ratelimit::RateLimiters;
use crate::services::auth::AuthService;
use crate::services::processor::Processor;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<Processor>,
    pub auth: Arc<AuthService>,
    pub limiters: Arc<RateLimiters>,
}

pub fn build_router(state: AppState) -> Router {
    let api = routes::api_router()
        .route_layer(middleware::from_fn_with_state(state.clone(), ratelimit::limit));
    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
