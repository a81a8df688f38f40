//! Authentication integration tests.
//!
//! Tests verify:
//! - Session tokens from the Authorization header and the `token` query
//! - Expired, tampered and foreign tokens are rejected
//! - Public routes stay reachable without credentials

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};

use wsi_gateway::server::{Authenticator, TokenAuth};

use super::test_utils::{json, TestApp, ALICE, BOB};

const TEST_SECRET: &str = "test-secret-key-for-hmac-signing";

async fn token_app() -> TestApp {
    TestApp::with_authenticator(Authenticator::tokens(TokenAuth::new(TEST_SECRET))).await
}

fn bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

// =============================================================================
// Valid Tokens
// =============================================================================

#[tokio::test]
async fn test_bearer_token_succeeds() {
    let app = token_app().await;
    let token = TokenAuth::new(TEST_SECRET).issue(ALICE, Duration::from_secs(3600));

    let (status, body) = app.send(bearer("/slides", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["slides"][0]["id"], 1);
}

#[tokio::test]
async fn test_query_token_succeeds_for_tiles() {
    let app = token_app().await;
    let token = TokenAuth::new(TEST_SECRET).issue(ALICE, Duration::from_secs(3600));

    let (status, _) = app
        .send(
            Request::builder()
                .uri(format!("/viewer/1_files/11/0_0.jpg?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_token_identifies_owner() {
    let app = token_app().await;
    let token = TokenAuth::new(TEST_SECRET).issue(BOB, Duration::from_secs(3600));

    let (status, _) = app.send(bearer("/viewer/1.dzi", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Rejected Tokens
// =============================================================================

#[tokio::test]
async fn test_expired_token_rejected() {
    let app = token_app().await;
    let token = TokenAuth::new(TEST_SECRET).issue_with_expiry(ALICE, 1);

    let (status, body) = app.send(bearer("/slides", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["error"], "token_expired");
}

#[tokio::test]
async fn test_token_from_different_key_rejected() {
    let app = token_app().await;
    let token = TokenAuth::new("another-secret").issue(ALICE, Duration::from_secs(3600));

    let (status, _) = app.send(bearer("/slides", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_user_rejected() {
    let app = token_app().await;
    let token = TokenAuth::new(TEST_SECRET).issue(ALICE, Duration::from_secs(3600));
    let forged = token.replacen(&ALICE.to_string(), &BOB.to_string(), 1);

    let (status, _) = app.send(bearer("/slides", &forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_header_ignored_when_tokens_required() {
    let app = token_app().await;

    let (status, _) = app.get(ALICE, "/slides").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Public Routes
// =============================================================================

#[tokio::test]
async fn test_public_routes_without_credentials() {
    let app = token_app().await;

    let (status, _) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);

    // The webhook authenticates with the shared secret, not a session token
    let (status, _) = app
        .post_json(
            None,
            "/inference/webhook/callback",
            serde_json::json!({
                "inference_task_id": "job-unknown",
                "state": "SUCCESS",
                "message": "done",
                "timestamp": "2026-01-01T00:00:00Z"
            }),
            Some(super::test_utils::WEBHOOK_SECRET),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
