use reqwest::StatusCode;
use serde_json::json;

use crate::common::{TestServer, error_code};

#[tokio::test]
async fn pending_game_rejects_delete_and_undo() {
    let server = TestServer::start_slow_engine().await;
    let id = server.create_computer_game().await;

    let (status, body) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "cccc"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["pending"], true);

    // The engine needs about a second; mutations inside the window bounce.
    let status = server.delete(&format!("/games/{id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server
        .post(&format!("/games/{id}/undo"), json!({"count": 1}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid-request");

    let (status, body) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "cccc"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(error_code(&body), "invalid-request");

    // Wait for the computer move, then the delete goes through.
    let body = server.wait_for_state_change(&id, 0).await;
    assert_eq!(body["state"], "ongoing");
    assert_eq!(
        server.delete(&format!("/games/{id}")).await,
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn second_human_move_during_pending_is_rejected() {
    let server = TestServer::start_slow_engine().await;
    let id = server.create_computer_game().await;

    let (status, _) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "cccc"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "e7e5"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(error_code(&body), "invalid-request");
}
