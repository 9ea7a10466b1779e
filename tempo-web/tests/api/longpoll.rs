use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::json;

use crate::common::TestServer;

#[tokio::test]
async fn stale_move_count_returns_immediately() {
    let server = TestServer::start().await;
    let id = server.create_human_game().await;

    let (status, body) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "e2e4"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let started = Instant::now();
    let body = server.wait_for_state_change(&id, 0).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(body["moves"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn waiter_wakes_when_a_move_lands() {
    let server = TestServer::start().await;
    let id = server.create_human_game().await;

    let waiter = {
        let server_base = server.base.clone();
        let client = server.client.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let response = client
                .get(format!("{server_base}/games/{id}?wait=true&moveCount=0"))
                .send()
                .await
                .expect("request");
            let body: serde_json::Value = response.json().await.expect("json");
            (started.elapsed(), body)
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    let (status, body) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "e2e4"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (elapsed, body) = waiter.await.expect("waiter task");
    assert!(elapsed < Duration::from_secs(5), "waited {elapsed:?}");
    assert_eq!(body["moves"], json!(["e2e4"]));
}

#[tokio::test]
async fn computer_game_pending_then_move_arrives() {
    let server = TestServer::start().await;
    let id = server.create_computer_game().await;

    let (_, body) = server.get(&format!("/games/{id}")).await;
    assert_eq!(body["turn"], "w");
    assert_eq!(body["state"], "ongoing");

    let (status, body) = server
        .post(&format!("/games/{id}/moves"), json!({"move": "cccc"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["pending"], true);
    assert_eq!(body["state"], "pending");

    // A concurrent long-poll observes the computer's move.
    let body = server.wait_for_state_change(&id, 0).await;
    assert_eq!(body["moves"].as_array().unwrap().len(), 1);
    assert_eq!(body["state"], "ongoing");
    assert_eq!(body["lastMove"]["playerColor"], "w");
    assert!(body["lastMove"]["score"].is_number());
    assert!(body["lastMove"]["depth"].is_number());
}

#[tokio::test]
async fn undo_wakes_waiters_registered_at_higher_count() {
    let server = TestServer::start().await;
    let id = server.create_human_game().await;

    for mv in ["e2e4", "e7e5"] {
        let (status, _) = server
            .post(&format!("/games/{id}/moves"), json!({"move": mv}))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let waiter = {
        let base = server.base.clone();
        let client = server.client.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let response = client
                .get(format!("{base}/games/{id}?wait=true&moveCount=2"))
                .send()
                .await
                .expect("request");
            response.json::<serde_json::Value>().await.expect("json")
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    let (status, body) = server
        .post(&format!("/games/{id}/undo"), json!({"count": 2}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let body = waiter.await.expect("waiter task");
    assert_eq!(body["moves"], json!([]));
}

#[tokio::test]
async fn delete_wakes_waiters_with_not_found() {
    let server = TestServer::start().await;
    let id = server.create_human_game().await;

    let waiter = {
        let base = server.base.clone();
        let client = server.client.clone();
        let id = id.clone();
        tokio::spawn(async move {
            client
                .get(format!("{base}/games/{id}?wait=true&moveCount=0"))
                .send()
                .await
                .expect("request")
                .status()
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        server.delete(&format!("/games/{id}")).await,
        StatusCode::NO_CONTENT
    );

    assert_eq!(waiter.await.expect("waiter task"), StatusCode::NOT_FOUND);
}
