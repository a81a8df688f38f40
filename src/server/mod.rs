//! HTTP server layer for the gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   /viewer/{id}.dzi   /viewer/{id}_files/...   /inference/...    │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │  inference  │  │ (identity)  │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod dzi;
pub mod handlers;
pub mod inference;
pub mod routes;

pub use auth::{identity_middleware, AuthError, Authenticator, Caller, TokenAuth, USER_ID_HEADER};
pub use handlers::{
    cache_stats_handler, clear_cache_handler, delete_slide_handler, dzi_descriptor_handler,
    health_handler, slides_handler, tile_handler, AppState, CacheResponse, DeleteSlideResponse,
    ErrorResponse, HandlerError, HealthResponse, SlidesResponse,
};
pub use inference::{StartInferenceRequest, TaskListQuery, TaskListResponse, TaskView};
pub use routes::{create_router, RouterConfig};
