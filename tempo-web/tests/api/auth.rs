use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::common::{TestServer, error_code};

async fn register(server: &TestServer, username: &str) -> (StatusCode, Value) {
    server
        .post(
            "/auth/register",
            json!({"username": username, "password": "secret99"}),
        )
        .await
}

#[tokio::test]
async fn register_login_me_flow() {
    let server = TestServer::start().await;

    let (status, body) = register(&server, "alice").await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let token = body["token"].as_str().expect("token").to_string();
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["expiresAt"].is_string());
    assert!(body["user"].get("passwordHash").is_none());

    let response = server
        .client
        .get(format!("{}/auth/me", server.base))
        .bearer_auth(&token)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let me: Value = response.json().await.expect("json");
    assert_eq!(me["username"], "alice");

    // Identifier matching is case-insensitive.
    let (status, body) = server
        .post(
            "/auth/login",
            json!({"identifier": "ALICE", "password": "secret99"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["token"].is_string());
    assert!(body["user"]["lastLoginAt"].is_string());
}

#[tokio::test]
async fn login_failures_are_uniformly_unauthorized() {
    let server = TestServer::start().await;
    register(&server, "bob").await;

    for (identifier, password) in [("bob", "wrong-pass1"), ("nobody", "secret99")] {
        let (status, body) = server
            .post(
                "/auth/login",
                json!({"identifier": identifier, "password": password}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "unauthorized");
    }
}

#[tokio::test]
async fn me_requires_a_valid_token() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "unauthorized");

    let response = server
        .client
        .get(format!("{}/auth/me", server.base))
        .bearer_auth("garbage-token")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_usernames_conflict_case_insensitively() {
    let server = TestServer::start().await;
    let (status, _) = register(&server, "carol").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = register(&server, "CAROL").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "conflict");
}

#[tokio::test]
async fn register_validates_username_and_password() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post(
            "/auth/register",
            json!({"username": "has space", "password": "secret99"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid-request");

    for password in ["short1", "lettersonly", "123456789"] {
        let (status, body) = server
            .post(
                "/auth/register",
                json!({"username": "dave", "password": password}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "password {password:?}");
        assert_eq!(error_code(&body), "invalid-request");
    }

    let (status, body) = server
        .post(
            "/auth/register",
            json!({"username": "dave", "password": "secret99", "email": "not-an-email"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid-request");
}

#[tokio::test]
async fn authenticated_create_binds_human_seats_to_user() {
    let server = TestServer::start().await;
    let (_, body) = register(&server, "erin").await;
    let token = body["token"].as_str().unwrap().to_string();
    let user_id = body["user"]["userId"].as_str().unwrap().to_string();

    let response = server
        .client
        .post(format!("{}/games", server.base))
        .bearer_auth(&token)
        .json(&json!({"white": {"type": 1}, "black": {"type": 2, "level": 2}}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("json");

    assert_eq!(body["players"]["white"]["id"], user_id.as_str());
    // The computer seat keeps its own opaque id.
    assert_ne!(body["players"]["black"]["id"], user_id.as_str());
}

#[tokio::test]
async fn accounts_require_persistence() {
    let server = TestServer::start_without_db().await;
    let (status, body) = register(&server, "frank").await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(error_code(&body), "invalid-request");
}
