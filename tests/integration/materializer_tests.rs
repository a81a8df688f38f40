//! Resource materialization tests.
//!
//! Tests verify:
//! - Concurrent requests for one resource share a single transfer
//! - A failed transfer reaches every waiter and is retried afterwards
//! - Missing objects and unsafe names are reported distinctly

use std::sync::Arc;
use std::time::Duration;

use wsi_gateway::error::MaterializeError;
use wsi_gateway::resource::{ResourceKind, ResourceMaterializer, StorageLayout};

use super::test_utils::{MemoryObjectStore, BUCKET};

async fn setup() -> (Arc<ResourceMaterializer>, Arc<MemoryObjectStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    store.put("slides/5.svs", vec![7u8; 4096]).await;
    store.put("results/job-5.json", "{}").await;

    let layout = StorageLayout::new(
        BUCKET,
        dir.path().join("slides"),
        dir.path().join("predictions"),
    );
    let materializer = Arc::new(ResourceMaterializer::new(store.clone(), layout));
    (materializer, store, dir)
}

#[tokio::test]
async fn test_concurrent_callers_share_one_transfer() {
    let (materializer, store, dir) = setup().await;
    store.set_delay(Duration::from_millis(100));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let materializer = materializer.clone();
        handles.push(tokio::spawn(async move {
            materializer
                .ensure_local(ResourceKind::Slide, "5", "svs")
                .await
        }));
    }

    let expected = dir.path().join("slides").join("5.svs");
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), expected);
    }

    assert_eq!(store.downloads(), 1);
    assert_eq!(materializer.transfers_in_flight(), 0);
    assert_eq!(tokio::fs::read(&expected).await.unwrap().len(), 4096);
    // No partial file is left behind
    assert!(!dir.path().join("slides").join("5.svs.partial").exists());
}

#[tokio::test]
async fn test_failure_reaches_all_waiters_then_retries() {
    let (materializer, store, dir) = setup().await;
    store.set_delay(Duration::from_millis(50));
    store.fail_next(1);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let materializer = materializer.clone();
        handles.push(tokio::spawn(async move {
            materializer
                .ensure_local(ResourceKind::Slide, "5", "svs")
                .await
        }));
    }
    for handle in handles {
        assert!(matches!(
            handle.await.unwrap(),
            Err(MaterializeError::TransferFailed { .. })
        ));
    }
    assert_eq!(store.downloads(), 1);
    assert!(!dir.path().join("slides").join("5.svs").exists());

    let path = materializer
        .ensure_local(ResourceKind::Slide, "5", "svs")
        .await
        .unwrap();
    assert!(path.exists());
    assert_eq!(store.downloads(), 2);
}

#[tokio::test]
async fn test_predictions_use_their_own_prefix_and_dir() {
    let (materializer, _, dir) = setup().await;

    let path = materializer
        .ensure_local(ResourceKind::Predictions, "job-5", "json")
        .await
        .unwrap();
    assert_eq!(path, dir.path().join("predictions").join("job-5.json"));
}

#[tokio::test]
async fn test_missing_object_and_bad_names() {
    let (materializer, store, _dir) = setup().await;

    assert!(matches!(
        materializer
            .ensure_local(ResourceKind::Slide, "6", "svs")
            .await,
        Err(MaterializeError::NotFound(_))
    ));
    assert!(matches!(
        materializer
            .ensure_local(ResourceKind::Slide, "../5", "svs")
            .await,
        Err(MaterializeError::InvalidName(_))
    ));
    assert_eq!(store.downloads(), 0);
}

#[tokio::test]
async fn test_discard_and_delete() {
    let (materializer, store, _dir) = setup().await;

    let path = materializer
        .ensure_local(ResourceKind::Slide, "5", "svs")
        .await
        .unwrap();

    assert!(materializer
        .discard_local(ResourceKind::Slide, "5", "svs")
        .await
        .unwrap());
    assert!(!path.exists());
    assert!(!materializer
        .discard_local(ResourceKind::Slide, "5", "svs")
        .await
        .unwrap());

    assert!(materializer
        .delete_remote(ResourceKind::Slide, "5", "svs")
        .await
        .unwrap());
    assert!(!store.contains("slides/5.svs").await);
    assert!(!materializer
        .delete_remote(ResourceKind::Slide, "5", "svs")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_discard_waits_for_in_flight_transfer() {
    let (materializer, store, dir) = setup().await;
    store.set_delay(Duration::from_millis(100));

    let pending = {
        let materializer = materializer.clone();
        tokio::spawn(async move {
            materializer
                .ensure_local(ResourceKind::Slide, "5", "svs")
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(materializer.transfers_in_flight(), 1);

    // Returns only once the transfer has landed, then removes its file
    assert!(materializer
        .discard_local(ResourceKind::Slide, "5", "svs")
        .await
        .unwrap());
    assert_eq!(materializer.transfers_in_flight(), 0);

    let _ = pending.await.unwrap();
    assert!(!dir.path().join("slides").join("5.svs").exists());
    assert_eq!(store.downloads(), 1);
}
