//! HTTP compute client tests against a local axum server.
//!
//! Tests verify:
//! - Request shape (path, API key header, JSON body)
//! - Status, timeout, transport and decoding failures

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use wsi_gateway::error::ComputeError;
use wsi_gateway::job::{ComputeService, HttpComputeClient, InferenceSubmission, TaskState};

const API_KEY: &str = "compute-key";

/// Requests seen by the fake compute service.
#[derive(Clone, Default)]
struct Seen {
    submissions: Arc<Mutex<Vec<Value>>>,
    cancels: Arc<Mutex<Vec<String>>>,
}

async fn submit(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return Err((StatusCode::UNAUTHORIZED, "bad api key".to_string()));
    }
    seen.submissions.lock().unwrap().push(body);
    Ok(Json(json!({"inference_task_id": "job-42", "state": "PENDING"})))
}

async fn cancel(State(seen): State<Seen>, Path(job_id): Path<String>) -> Json<Value> {
    seen.cancels.lock().unwrap().push(job_id);
    Json(json!({"state": "REVOKED"}))
}

/// Serve `router` on an ephemeral port and return its base URL.
async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn fake_service() -> (String, Seen) {
    let seen = Seen::default();
    let router = Router::new()
        .route("/inference", post(submit))
        .route("/inference/tasks/{job_id}", delete(cancel))
        .with_state(seen.clone());
    (spawn_server(router).await, seen)
}

fn submission() -> InferenceSubmission {
    InferenceSubmission {
        slide_id: "1".to_string(),
        file_extension: "svs".to_string(),
        confidence: 0.5,
    }
}

#[tokio::test]
async fn test_submit_sends_key_and_body() {
    let (url, seen) = fake_service().await;
    // Trailing slash is tolerated
    let client = HttpComputeClient::new(format!("{}/", url), API_KEY);

    let receipt = client.submit(&submission()).await.unwrap();
    assert_eq!(receipt.inference_task_id, "job-42");
    assert_eq!(receipt.state, TaskState::Pending);

    let submissions = seen.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0]["slide_id"], "1");
    assert_eq!(submissions[0]["file_extension"], "svs");
    assert_eq!(submissions[0]["confidence"], 0.5);
}

#[tokio::test]
async fn test_submit_rejected_status() {
    let (url, _) = fake_service().await;
    let client = HttpComputeClient::new(url, "wrong-key");

    match client.submit(&submission()).await {
        Err(ComputeError::Status { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad api key");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_encodes_job_id() {
    let (url, seen) = fake_service().await;
    let client = HttpComputeClient::new(url, API_KEY);

    let state = client.cancel("job 7").await.unwrap();
    assert_eq!(state, TaskState::Revoked);
    assert_eq!(*seen.cancels.lock().unwrap(), vec!["job 7".to_string()]);
}

#[tokio::test]
async fn test_submit_timeout() {
    let router = Router::new().route(
        "/inference",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({"inference_task_id": "late", "state": "PENDING"}))
        }),
    );
    let url = spawn_server(router).await;
    let client = HttpComputeClient::new(url, API_KEY)
        .with_timeouts(Duration::from_millis(100), Duration::from_millis(100));

    match client.submit(&submission()).await {
        Err(ComputeError::Timeout { operation }) => assert_eq!(operation, "start"),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_response_body() {
    let router = Router::new().route(
        "/inference/tasks/{job_id}",
        delete(|| async { Json(json!({"status": "gone"})) }),
    );
    let url = spawn_server(router).await;
    let client = HttpComputeClient::new(url, API_KEY);

    assert!(matches!(
        client.cancel("job-1").await,
        Err(ComputeError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_unreachable_service() {
    // Grab a free port, then close it
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpComputeClient::new(format!("http://{}", addr), API_KEY);
    assert!(matches!(
        client.cancel("job-1").await,
        Err(ComputeError::Transport(_))
    ));
}
