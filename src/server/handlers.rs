//! HTTP request handlers for slides, tiles and maintenance.
//!
//! This module contains the Axum handlers for the viewer endpoints, slide
//! management and health checks, plus the mapping from domain errors to
//! JSON error responses. Inference handlers live in
//! [`super::inference`].
//!
//! # Endpoints
//!
//! - `GET /viewer/{slide_id}.dzi` - Deep Zoom descriptor
//! - `GET /viewer/{slide_id}_files/{level}/{col}_{row}.jpg` - Serve a tile
//! - `GET /slides` - List the caller's slides
//! - `DELETE /slides/{slide_id}` - Delete a slide
//! - `GET /cache` / `DELETE /cache` - Inspect or clear the metadata cache
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{JobError, MaterializeError, SlideError, TileError};
use crate::job::{JobTracker, PredictionService};
use crate::slide::CacheStats;
use crate::store::{SlideId, SlideRecord};
use crate::tile::TileService;

use super::auth::Caller;
use super::dzi::{generate_dzi_xml, parse_descriptor_name, parse_files_dir, parse_tile_coords};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Descriptor and tile rendering
    pub tiles: Arc<TileService>,

    /// Inference job lifecycle
    pub tracker: Arc<JobTracker>,

    /// Prediction overlays for finished jobs
    pub predictions: Arc<PredictionService>,

    /// Cache-Control max-age in seconds for descriptors and tiles
    pub cache_max_age: u32,
}

impl AppState {
    /// Create application state with a 1 hour cache max-age.
    pub fn new(
        tiles: Arc<TileService>,
        tracker: Arc<JobTracker>,
        predictions: Arc<PredictionService>,
    ) -> Self {
        Self {
            tiles,
            tracker,
            predictions,
            cache_max_age: 3600,
        }
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    fn cache_control(&self) -> String {
        format!("private, max-age={}", self.cache_max_age)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_level")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Whether retrying the same request may succeed
    pub retryable: bool,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
            retryable: false,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
            retryable: false,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Response from the slides list endpoint.
#[derive(Debug, Serialize)]
pub struct SlidesResponse {
    pub slides: Vec<SlideRecord>,
}

/// Response from the slide delete endpoint.
#[derive(Debug, Serialize)]
pub struct DeleteSlideResponse {
    pub id: SlideId,
    pub message: String,
}

/// Response from the cache endpoints.
#[derive(Debug, Serialize)]
pub struct CacheResponse {
    pub metadata: CacheStats,
    /// Remote transfers currently running
    pub transfers_in_flight: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Status, error type and retryability of a materialization failure.
fn materialize_parts(err: &MaterializeError) -> (StatusCode, &'static str, bool) {
    match err {
        MaterializeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
        MaterializeError::InvalidName(_) => (StatusCode::BAD_REQUEST, "invalid_request", false),
        MaterializeError::TransferFailed { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "transfer_failed", true)
        }
    }
}

/// Status, error type and retryability of a tile failure.
fn tile_parts(err: &TileError) -> (StatusCode, &'static str, bool) {
    match err {
        // 404 Not Found
        TileError::SlideNotFound { .. } => (StatusCode::NOT_FOUND, "not_found", false),

        // 400 Bad Request - Invalid parameters
        TileError::InvalidLevel { .. } => (StatusCode::BAD_REQUEST, "invalid_level", false),
        TileError::TileOutOfBounds { .. } => {
            (StatusCode::BAD_REQUEST, "tile_out_of_bounds", false)
        }

        TileError::Materialize(err) => materialize_parts(err),

        // Files that cannot be decoded map to 415 Unsupported Media Type
        TileError::Slide(SlideError::Open { .. }) => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_format",
            false,
        ),
        TileError::Slide(_) => (StatusCode::INTERNAL_SERVER_ERROR, "slide_read_error", false),

        // 500 Internal Server Error
        TileError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error", false),
        TileError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error", false),
        TileError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", false),
    }
}

/// Status, error type and retryability of a job failure.
fn job_parts(err: &JobError) -> (StatusCode, &'static str, bool) {
    match err {
        JobError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
        JobError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", false),
        JobError::InvalidState(_) => (StatusCode::BAD_REQUEST, "invalid_state", false),
        JobError::InvalidConfidence(_) => (StatusCode::BAD_REQUEST, "invalid_confidence", false),
        JobError::UpstreamTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", true),
        JobError::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "upstream_error", true),
        JobError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error", false),
        JobError::Predictions(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "invalid_predictions",
            false,
        ),
        JobError::Materialize(err) => materialize_parts(err),
        JobError::Tile(err) => tile_parts(err),
    }
}

/// Build the JSON error response, logging by severity:
/// - 5xx errors are logged at ERROR level (server errors)
/// - 404s at DEBUG level (common and expected)
/// - other 4xx errors at WARN level (client errors)
fn error_response(
    status: StatusCode,
    error_type: &'static str,
    retryable: bool,
    message: String,
) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status).retryable(retryable);
    (status, Json(body)).into_response()
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type, retryable) = tile_parts(&self);
        error_response(status, error_type, retryable, self.to_string())
    }
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let (status, error_type, retryable) = job_parts(&self);
        error_response(status, error_type, retryable, self.to_string())
    }
}

/// Error returned by any handler.
#[derive(Debug)]
pub enum HandlerError {
    Tile(TileError),
    Job(JobError),
    /// Malformed path or body that the extractors accepted
    BadRequest(String),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Tile(err) => err.into_response(),
            HandlerError::Job(err) => err.into_response(),
            HandlerError::BadRequest(message) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request", false, message)
            }
        }
    }
}

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError::Tile(err)
    }
}

impl From<JobError> for HandlerError {
    fn from(err: JobError) -> Self {
        HandlerError::Job(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle DZI descriptor requests.
///
/// # Endpoint
///
/// `GET /viewer/{slide_id}.dzi`
///
/// # Response
///
/// `200 OK` with `application/xml` body:
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
///        TileSize="512"
///        Overlap="0"
///        Format="jpg">
///   <Size Width="46920" Height="33600" />
/// </Image>
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Name is not `{numeric id}.dzi`
/// - `404 Not Found`: Slide not found or not owned
/// - `415 Unsupported Media Type`: Slide file cannot be decoded
/// - `503 Service Unavailable`: Slide could not be fetched from storage
pub async fn dzi_descriptor_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(descriptor): Path<String>,
) -> Result<Response, HandlerError> {
    let slide_id = parse_descriptor_name(&descriptor).ok_or_else(|| {
        HandlerError::BadRequest(format!("Invalid descriptor name: {}", descriptor))
    })?;

    let descriptor = state.tiles.describe(caller.user_id, slide_id).await?;
    let xml = generate_dzi_xml(
        descriptor.width,
        descriptor.height,
        descriptor.tile_size,
        descriptor.format,
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/xml".to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
        ],
        xml,
    )
        .into_response())
}

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /viewer/{slide_id}_files/{level}/{col}_{row}.jpg`
///
/// # Response
///
/// - `200 OK`: JPEG tile, always `tile_size` square
/// - `400 Bad Request`: Invalid level or tile coordinates
/// - `404 Not Found`: Slide not found
/// - `415 Unsupported Media Type`: Slide file cannot be decoded
/// - `503 Service Unavailable`: Slide could not be fetched from storage
///
/// # Headers
///
/// - `Content-Type: image/jpeg`
/// - `Cache-Control: private, max-age={cache_max_age}`
pub async fn tile_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path((slide_files, level, tile)): Path<(String, usize, String)>,
) -> Result<Response, HandlerError> {
    let slide_id = parse_files_dir(&slide_files).ok_or_else(|| {
        HandlerError::BadRequest(format!("Invalid tile directory: {}", slide_files))
    })?;
    let (col, row) = parse_tile_coords(&tile, state.tiles.extension())
        .ok_or_else(|| HandlerError::BadRequest(format!("Invalid tile name: {}", tile)))?;

    let data = state
        .tiles
        .get_tile(caller.user_id, slide_id, level, col, row)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, state.tiles.content_type().to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
        ],
        data,
    )
        .into_response())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle slides list requests.
///
/// # Endpoint
///
/// `GET /slides`
pub async fn slides_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<SlidesResponse>, HandlerError> {
    let slides = state.tiles.list_slides(caller.user_id).await?;
    Ok(Json(SlidesResponse { slides }))
}

/// Handle slide deletion.
///
/// # Endpoint
///
/// `DELETE /slides/{slide_id}`
///
/// Removes the remote object, the local copy, cached metadata and the
/// catalog record.
pub async fn delete_slide_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(slide_id): Path<SlideId>,
) -> Result<Json<DeleteSlideResponse>, HandlerError> {
    let record = state.tiles.delete_slide(caller.user_id, slide_id).await?;
    Ok(Json(DeleteSlideResponse {
        id: record.id,
        message: "Slide deleted".to_string(),
    }))
}

/// Handle cache inspection.
///
/// # Endpoint
///
/// `GET /cache`
pub async fn cache_stats_handler(
    State(state): State<AppState>,
    _caller: Caller,
) -> Json<CacheResponse> {
    Json(CacheResponse {
        metadata: state.tiles.cache().stats().await,
        transfers_in_flight: state.tiles.materializer().transfers_in_flight(),
    })
}

/// Handle cache clearing.
///
/// # Endpoint
///
/// `DELETE /cache`
///
/// Drops every cached slide handle. Local files are kept.
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> Json<CacheResponse> {
    state.tiles.cache().clear().await;
    info!(user = caller.user_id, "Slide metadata cache cleared");

    Json(CacheResponse {
        metadata: state.tiles.cache().stats().await,
        transfers_in_flight: state.tiles.materializer().transfers_in_flight(),
    })
}

// =============================================================================
// Tests
// =============================================================================
