//! API integration tests for descriptors, tiles and slide management.
//!
//! Tests verify:
//! - DZI descriptors and tile retrieval through the router
//! - Single-flight materialization under concurrent tile requests
//! - Error cases and their HTTP status codes
//! - Slide deletion and cache endpoints

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use wsi_gateway::store::SlideRecord;

use super::test_utils::{is_valid_jpeg, json, TestApp, ALICE, BOB, SLIDE_HEIGHT, SLIDE_WIDTH};

// =============================================================================
// Descriptors
// =============================================================================

#[tokio::test]
async fn test_health_needs_no_identity() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "healthy");
}

#[tokio::test]
async fn test_dzi_descriptor() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/viewer/1.dzi")
                .header("x-user-id", ALICE.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/xml"
    );
    assert!(response.headers().contains_key("cache-control"));

    let (_, body) = app.get(ALICE, "/viewer/1.dzi").await;
    let xml = String::from_utf8(body.to_vec()).unwrap();
    assert!(xml.contains(&format!(r#"Width="{}""#, SLIDE_WIDTH)));
    assert!(xml.contains(&format!(r#"Height="{}""#, SLIDE_HEIGHT)));
    assert!(xml.contains(r#"TileSize="512""#));
    assert!(xml.contains(r#"Format="jpg""#));
}

#[tokio::test]
async fn test_dzi_for_another_users_slide_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app.get(BOB, "/viewer/1.dzi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "not_found");

    // Nothing was fetched for a slide the caller cannot see
    assert_eq!(app.store.downloads(), 0);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(
            Request::builder()
                .uri("/viewer/1.dzi")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_descriptor_name() {
    let app = TestApp::new().await;

    let (status, body) = app.get(ALICE, "/viewer/one.dzi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_request");
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_full_resolution_tile() {
    let app = TestApp::new().await;

    let (status, body) = app.get(ALICE, "/viewer/1_files/11/0_0.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert!(is_valid_jpeg(&body));

    let tile = image::load_from_memory(&body).unwrap();
    assert_eq!((tile.width(), tile.height()), (512, 512));
}

#[tokio::test]
async fn test_edge_tile_is_padded_to_tile_size() {
    let app = TestApp::new().await;

    // Level 11 is 2000x1500, so tile (3, 2) holds 464x476 pixels
    let (status, body) = app.get(ALICE, "/viewer/1_files/11/3_2.jpg").await;
    assert_eq!(status, StatusCode::OK);

    let tile = image::load_from_memory(&body).unwrap().into_rgb8();
    assert_eq!(tile.dimensions(), (512, 512));
    let padding = tile.get_pixel(510, 510);
    assert!(padding.0.iter().all(|&c| c < 16), "padding should be black");
}

#[tokio::test]
async fn test_low_level_tile() {
    let app = TestApp::new().await;

    let (status, body) = app.get(ALICE, "/viewer/1_files/0/0_0.jpg").await;
    assert_eq!(status, StatusCode::OK);
    let tile = image::load_from_memory(&body).unwrap();
    assert_eq!((tile.width(), tile.height()), (512, 512));
}

#[tokio::test]
async fn test_tile_errors() {
    let app = TestApp::new().await;

    let (status, body) = app.get(ALICE, "/viewer/1_files/12/0_0.jpg").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_level");

    let (status, body) = app.get(ALICE, "/viewer/1_files/11/4_0.jpg").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "tile_out_of_bounds");

    let (status, _) = app.get(ALICE, "/viewer/1_files/11/0-0.jpg").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get(ALICE, "/viewer/1_files/11/0_0.png").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get(BOB, "/viewer/1_files/11/0_0.jpg").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_tiles_download_once() {
    let app = TestApp::new().await;
    app.store.set_delay(Duration::from_millis(100));

    let mut handles = Vec::new();
    for col in 0..4 {
        let router = app.router.clone();
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .uri(format!("/viewer/1_files/11/{}_0.jpg", col))
                .header("x-user-id", ALICE.to_string())
                .body(Body::empty())
                .unwrap();
            router.oneshot(request).await.unwrap().status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(app.store.downloads(), 1);

    // Later requests are served from local disk
    let (status, _) = app.get(ALICE, "/viewer/1_files/10/0_0.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.downloads(), 1);
}

#[tokio::test]
async fn test_failed_transfer_is_retryable() {
    let app = TestApp::new().await;
    app.store.fail_next(1);

    let (status, body) = app.get(ALICE, "/viewer/1.dzi").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error = json(&body);
    assert_eq!(error["error"], "transfer_failed");
    assert_eq!(error["retryable"], true);

    let (status, _) = app.get(ALICE, "/viewer/1.dzi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.downloads(), 2);
}

#[tokio::test]
async fn test_missing_remote_object() {
    let app = TestApp::new().await;
    app.records
        .add_slide(SlideRecord {
            id: 3,
            owner_id: ALICE,
            name: "lost".to_string(),
            extension: "svs".to_string(),
        })
        .await;

    let (status, body) = app.get(ALICE, "/viewer/3.dzi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["retryable"], false);
}

#[tokio::test]
async fn test_undecodable_slide() {
    let app = TestApp::new().await;
    app.store.put("slides/4.svs", b"not an image".to_vec()).await;
    app.records
        .add_slide(SlideRecord {
            id: 4,
            owner_id: ALICE,
            name: "corrupt".to_string(),
            extension: "svs".to_string(),
        })
        .await;

    let (status, body) = app.get(ALICE, "/viewer/4.dzi").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json(&body)["error"], "unsupported_format");
}

// =============================================================================
// Slides
// =============================================================================

#[tokio::test]
async fn test_slides_are_scoped_to_owner() {
    let app = TestApp::new().await;

    let (status, body) = app.get_json(ALICE, "/slides").await;
    assert_eq!(status, StatusCode::OK);
    let slides = body["slides"].as_array().unwrap();
    assert_eq!(slides.len(), 1);
    assert_eq!(slides[0]["id"], 1);
    assert_eq!(slides[0]["name"], "biopsy-1");
}

#[tokio::test]
async fn test_delete_slide() {
    let app = TestApp::new().await;

    // Materialize and cache first
    let (status, _) = app.get(ALICE, "/viewer/1.dzi").await;
    assert_eq!(status, StatusCode::OK);
    let local = app.dir.path().join("slides").join("1.png");
    assert!(local.exists());

    let (status, _) = app.delete(BOB, "/slides/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.contains("slides/1.png").await);

    let (status, body) = app.delete(ALICE, "/slides/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["id"], 1);

    assert!(!app.store.contains("slides/1.png").await);
    assert!(!local.exists());
    assert_eq!(app.tiles.cache().stats().await.entries, 0);

    let (status, _) = app.get(ALICE, "/viewer/1.dzi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn test_cache_stats_and_clear() {
    let app = TestApp::new().await;
    app.get(ALICE, "/viewer/1.dzi").await;

    let (status, body) = app.get_json(ALICE, "/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["entries"], 1);
    assert_eq!(body["transfers_in_flight"], 0);

    let (status, body) = app.delete(ALICE, "/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["metadata"]["entries"], 0);

    // Clearing keeps local files, so nothing is downloaded again
    let (status, _) = app.get(ALICE, "/viewer/1.dzi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.downloads(), 1);
}
