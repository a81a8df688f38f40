//! Router configuration for the gateway.
//!
//! This module defines the HTTP routes and applies middleware for caller
//! identity and CORS.
//!
//! # Route Structure
//!
//! ```text
//! /health                                        - Health check (public)
//! /inference/webhook/callback                    - Compute webhook (X-API-Key)
//! /viewer/{slide_id}.dzi                         - DZI descriptor (protected)
//! /viewer/{slide_id}_files/{level}/{col}_{row}.jpg - Tile (protected)
//! /slides, /slides/{slide_id}, /slides/{slide_id}/tasks (protected)
//! /inference, /inference/tasks[/{task_id}[/predictions]] (protected)
//! /cache                                         - Metadata cache (protected)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use wsi_gateway::server::{create_router, AppState, Authenticator, RouterConfig, TokenAuth};
//!
//! let state = AppState::new(tiles, tracker, predictions);
//! let config = RouterConfig::new(Authenticator::tokens(TokenAuth::new("my-secret-key")))
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(state, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{identity_middleware, Authenticator, USER_ID_HEADER};
use super::handlers::{
    cache_stats_handler, clear_cache_handler, delete_slide_handler, dzi_descriptor_handler,
    health_handler, slides_handler, tile_handler, AppState,
};
use super::inference::{
    cancel_task_handler, get_task_handler, list_tasks_handler, predictions_handler,
    slide_tasks_handler, start_inference_handler, webhook_handler,
};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// How callers are identified on protected routes
    pub authenticator: Authenticator,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default CORS allows any origin and tracing is enabled.
    pub fn new(authenticator: Authenticator) -> Self {
        Self {
            authenticator,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Create a configuration that trusts the `X-User-Id` header.
    ///
    /// **Warning**: This should only be used for development/testing.
    pub fn without_auth() -> Self {
        Self::new(Authenticator::trusted())
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Every route except `/health` and the webhook resolves the caller through
/// [`identity_middleware`]. The webhook checks the shared secret itself.
pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let cors = build_cors_layer(&config);

    let protected_routes = Router::new()
        .route("/viewer/{descriptor}", get(dzi_descriptor_handler))
        .route("/viewer/{slide_files}/{level}/{tile}", get(tile_handler))
        .route("/slides", get(slides_handler))
        .route("/slides/{slide_id}", delete(delete_slide_handler))
        .route("/slides/{slide_id}/tasks", get(slide_tasks_handler))
        .route("/inference", post(start_inference_handler))
        .route("/inference/tasks", get(list_tasks_handler))
        .route(
            "/inference/tasks/{task_id}",
            get(get_task_handler).delete(cancel_task_handler),
        )
        .route(
            "/inference/tasks/{task_id}/predictions",
            get(predictions_handler),
        )
        .route(
            "/cache",
            get(cache_stats_handler).delete(clear_cache_handler),
        )
        .layer(middleware::from_fn_with_state(
            config.authenticator.clone(),
            identity_middleware,
        ));

    // Public routes (no caller identity)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/inference/webhook/callback", post(webhook_handler));

    let router = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
