//! Test utilities for integration tests.
//!
//! In-memory stand-ins for the object store and the compute service, plus a
//! fully wired router over a temporary local storage root.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tower::ServiceExt;

use wsi_gateway::error::{ComputeError, IoError};
use wsi_gateway::io::{ObjectStore, RemoteKey};
use wsi_gateway::job::{
    ComputeService, InferenceSubmission, JobTracker, PredictionService, SharedSecret,
    SubmissionReceipt, TaskState,
};
use wsi_gateway::resource::{ResourceMaterializer, StorageLayout};
use wsi_gateway::server::{create_router, AppState, Authenticator, RouterConfig};
use wsi_gateway::slide::{PyramidCache, RasterDecoder};
use wsi_gateway::store::{MemoryStore, SlideRecord, UserId};
use wsi_gateway::tile::{JpegTileEncoder, TileRenderer, TileService};

pub const BUCKET: &str = "test-bucket";
pub const WEBHOOK_SECRET: &str = "hook-secret";

/// Owner of slide 1.
pub const ALICE: UserId = 7;
/// Owner of slide 2.
pub const BOB: UserId = 8;

pub const SLIDE_WIDTH: u32 = 2000;
pub const SLIDE_HEIGHT: u32 = 1500;

// =============================================================================
// In-memory Object Store
// =============================================================================

/// Object store backed by a map, counting transfers.
///
/// Transfers can be slowed down and made to fail a given number of times.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
    downloads: AtomicUsize,
    failures_left: AtomicUsize,
    delay: std::sync::Mutex<Duration>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: &str, data: impl Into<Bytes>) {
        self.objects.write().await.insert(key.to_string(), data.into());
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// Number of completed or attempted downloads.
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Make the next `count` downloads fail with a connection error.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, key: &RemoteKey) -> Result<bool, IoError> {
        Ok(self.objects.read().await.contains_key(&key.key))
    }

    async fn get(&self, key: &RemoteKey) -> Result<Bytes, IoError> {
        self.objects
            .read()
            .await
            .get(&key.key)
            .cloned()
            .ok_or_else(|| IoError::NotFound(key.to_string()))
    }

    async fn download(&self, key: &RemoteKey, dest: &Path) -> Result<u64, IoError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(IoError::Connection("connection reset by peer".to_string()));
        }

        let data = self.get(key).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(data.len() as u64)
    }

    async fn delete(&self, key: &RemoteKey) -> Result<(), IoError> {
        self.objects.write().await.remove(&key.key);
        Ok(())
    }
}

// =============================================================================
// Fake Compute Service
// =============================================================================

/// Compute service that accepts every job as `job-{n}`.
#[derive(Default)]
pub struct FakeCompute {
    submissions: std::sync::Mutex<Vec<InferenceSubmission>>,
    cancels: std::sync::Mutex<Vec<String>>,
    fail_with: std::sync::Mutex<Option<ComputeError>>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<InferenceSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }

    /// Fail every following call with `err`.
    pub fn fail_with(&self, err: ComputeError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    fn check(&self) -> Result<(), ComputeError> {
        match self.fail_with.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ComputeService for FakeCompute {
    async fn submit(
        &self,
        submission: &InferenceSubmission,
    ) -> Result<SubmissionReceipt, ComputeError> {
        self.check()?;
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(submission.clone());
        Ok(SubmissionReceipt {
            inference_task_id: format!("job-{}", submissions.len()),
            state: TaskState::Pending,
        })
    }

    async fn cancel(&self, job_id: &str) -> Result<TaskState, ComputeError> {
        self.check()?;
        self.cancels.lock().unwrap().push(job_id.to_string());
        Ok(TaskState::Revoked)
    }
}

// =============================================================================
// Slide Fixtures
// =============================================================================

/// PNG-encoded gradient image.
pub fn create_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut data = Cursor::new(Vec::new());
    image.write_to(&mut data, ImageFormat::Png).unwrap();
    data.into_inner()
}

/// Check if data is a valid JPEG (starts with SOI and ends with EOI).
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4
        && data[0] == 0xFF
        && data[1] == 0xD8
        && data[data.len() - 2] == 0xFF
        && data[data.len() - 1] == 0xD9
}

// =============================================================================
// Wired Application
// =============================================================================

/// A router with every collaborator exposed for assertions.
///
/// Slide 1 (`slides/1.png`, 2000x1500) is owned by [`ALICE`], slide 2
/// (`slides/2.png`, 600x400) by [`BOB`].
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryObjectStore>,
    pub records: Arc<MemoryStore>,
    pub compute: Arc<FakeCompute>,
    pub tiles: Arc<TileService>,
    pub dir: TempDir,
}

impl TestApp {
    /// Identity from the `X-User-Id` header.
    pub async fn new() -> Self {
        Self::with_authenticator(Authenticator::trusted()).await
    }

    pub async fn with_authenticator(authenticator: Authenticator) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let store = Arc::new(MemoryObjectStore::new());
        store
            .put("slides/1.png", create_png(SLIDE_WIDTH, SLIDE_HEIGHT))
            .await;
        store.put("slides/2.png", create_png(600, 400)).await;

        let layout = StorageLayout::new(
            BUCKET,
            dir.path().join("slides"),
            dir.path().join("predictions"),
        );
        let materializer = Arc::new(ResourceMaterializer::new(store.clone(), layout));

        let records = Arc::new(MemoryStore::with_slides([
            SlideRecord {
                id: 1,
                owner_id: ALICE,
                name: "biopsy-1".to_string(),
                extension: "png".to_string(),
            },
            SlideRecord {
                id: 2,
                owner_id: BOB,
                name: "biopsy-2".to_string(),
                extension: "png".to_string(),
            },
        ]));

        let cache = Arc::new(PyramidCache::new(Arc::new(RasterDecoder::new())));
        let renderer = TileRenderer::new(512, Arc::new(JpegTileEncoder::new()));
        let tiles = Arc::new(TileService::new(
            records.clone(),
            materializer.clone(),
            cache,
            renderer,
        ));

        let compute = Arc::new(FakeCompute::new());
        let tracker = Arc::new(JobTracker::new(
            records.clone(),
            records.clone(),
            compute.clone(),
            SharedSecret::new(WEBHOOK_SECRET),
        ));
        let predictions = Arc::new(PredictionService::new(
            records.clone(),
            materializer,
            tiles.clone(),
        ));

        let state = AppState::new(tiles.clone(), tracker, predictions);
        let router = create_router(
            state,
            RouterConfig::new(authenticator).with_tracing(false),
        );

        Self {
            router,
            store,
            records,
            compute,
            tiles,
            dir,
        }
    }

    /// Send a request as `user` and return the status and body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    pub async fn get(&self, user: UserId, uri: &str) -> (StatusCode, Bytes) {
        self.send(
            Request::builder()
                .uri(uri)
                .header("x-user-id", user.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, user: UserId, uri: &str) -> (StatusCode, Bytes) {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .header("x-user-id", user.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(
        &self,
        user: Option<UserId>,
        uri: &str,
        body: serde_json::Value,
        api_key: Option<&str>,
    ) -> (StatusCode, Bytes) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get_json(&self, user: UserId, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.get(user, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}

/// Parse a JSON body.
pub fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}
