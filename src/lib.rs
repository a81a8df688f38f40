//! # WSI Gateway
//!
//! A gateway for viewing Whole Slide Images (WSI) and orchestrating
//! inference jobs on them.
//!
//! Slides and prediction results live in S3-compatible object storage. The
//! gateway pulls them to local disk on first use, serves Deep Zoom tiles
//! to browser viewers, and tracks inference jobs run by an external compute
//! service.
//!
//! ## Features
//!
//! - **Single-flight materialization**: Concurrent requests for the same
//!   remote object share one download
//! - **Deep Zoom tiles**: DZI descriptors and fixed-size JPEG tiles rendered
//!   from the nearest native pyramid level
//! - **Metadata cache**: Opened slides are kept for a fixed TTL
//! - **Inference jobs**: Start, cancel and reconcile jobs through webhooks
//! - **Authentication**: HMAC-SHA256 session tokens
//!
//! ## Architecture
//!
//! - [`io`] - Remote object store access
//! - [`resource`] - Remote/local layout and single-flight downloads
//! - [`slide`] - Slide decoding and the pyramid metadata cache
//! - [`tile`] - Deep Zoom geometry, rendering and encoding
//! - [`job`] - Inference job lifecycle and prediction overlays
//! - [`store`] - Slide and task records
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust
//! use wsi_gateway::server::auth::TokenAuth;
//! use std::time::Duration;
//!
//! let auth = TokenAuth::new("my-secret-key");
//! let token = auth.issue(7, Duration::from_secs(3600));
//! assert_eq!(auth.verify(&token).unwrap(), 7);
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod job;
pub mod resource;
pub mod server;
pub mod single_flight;
pub mod slide;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, ServeConfig, TokenConfig};
pub use error::{
    ComputeError, IoError, JobError, MaterializeError, SlideError, StoreError, TileError,
};
pub use io::{create_s3_client, ObjectStore, RemoteKey, S3ObjectStore};
pub use job::{
    ComputeService, HttpComputeClient, JobTracker, PredictionOverlay, PredictionService,
    SharedSecret, Task, TaskState, WebhookAck, WebhookNotice,
};
pub use resource::{ResourceKind, ResourceMaterializer, StorageLayout};
pub use server::{create_router, AppState, Authenticator, RouterConfig, TokenAuth};
pub use single_flight::SingleFlight;
pub use slide::{PyramidCache, RasterDecoder, SlideInfo};
pub use store::{MemoryStore, SlideCatalog, SlideRecord, TaskStore};
pub use tile::{JpegTileEncoder, TileRenderer, TileService};
