use reqwest::StatusCode;
use serde_json::json;

use crate::common::{TestServer, eventually};

#[tokio::test]
async fn health_reports_ok_with_storage() {
    let server = TestServer::start().await;
    let body = server.health().await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "ok");
    assert!(body["time"].is_string());
}

#[tokio::test]
async fn health_reports_disabled_without_database() {
    let server = TestServer::start_without_db().await;
    let body = server.health().await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "disabled");

    // Games still work from memory alone.
    let id = server.create_human_game().await;
    let (status, body) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "e2e4"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn first_write_failure_degrades_storage_but_not_games() {
    let server = TestServer::start().await;

    // Make the first game write fail at commit time.
    let pool = server
        .processor
        .storage()
        .pool()
        .expect("test server has a pool")
        .clone();
    sqlx::raw_sql("DROP TABLE moves; DROP TABLE games;")
        .execute(&pool)
        .await
        .expect("drop tables");

    let id = server.create_human_game().await;

    let server_ref = &server;
    eventually(async || server_ref.health().await["storage"] == "degraded").await;

    // In-memory play continues; no 5xx anywhere.
    let (status, body) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "e2e4"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["moves"], json!(["e2e4"]));
    assert_eq!(server.health().await["storage"], "degraded");
}
