use reqwest::StatusCode;

use crate::common::TestServer;

const MISSING_GAME: &str = "/games/123e4567-e89b-12d3-a456-426614174000";

#[tokio::test]
async fn general_bucket_rejects_the_21st_request() {
    let server = TestServer::start().await;

    // Dev mode allows a burst of 20 per second per client IP.
    for i in 0..20 {
        let (status, _) = server.get(MISSING_GAME).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "request {i}");
    }
    let (status, body) = server.get(MISSING_GAME).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS, "{body}");
    assert_eq!(body["error"]["code"], "rate-limit-exceeded");
}

#[tokio::test]
async fn forwarded_for_header_identifies_the_client() {
    let server = TestServer::start().await;

    // Exhaust the peer-address bucket.
    for _ in 0..21 {
        let _ = server.get(MISSING_GAME).await;
    }
    let (status, _) = server.get(MISSING_GAME).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // A request attributed to a different client is unaffected.
    let response = server
        .client
        .get(format!("{}{MISSING_GAME}", server.base))
        .header("x-forwarded-for", "198.51.100.9")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let server = TestServer::start().await;
    for _ in 0..30 {
        let body = server.health().await;
        assert_eq!(body["status"], "ok");
    }
}
