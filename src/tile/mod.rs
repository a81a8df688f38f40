//! Tile service layer.
//!
//! Deep Zoom geometry, tile rendering and the service that ties them to
//! slide storage.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ TileRenderer │  │  ImageEncoder   │  │
//! │  │ (plan, read, │  │  (JPEG, fixed   │  │
//! │  │  resize, pad)│  │   quality)      │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   ResourceMaterializer + PyramidCache   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: entry point for descriptor and tile requests
//! - [`TileRenderer`]: turns one Deep Zoom tile address into encoded bytes
//! - [`geometry`]: pure pyramid arithmetic, including [`plan_tile`]
//! - [`JpegTileEncoder`]: the shipped [`ImageEncoder`]
//!
//! # Example
//!
//! ```
//! use wsi_gateway::tile::{deep_zoom_dimensions, max_level, tile_grid};
//!
//! let levels = deep_zoom_dimensions(10000, 8000);
//! assert_eq!(max_level(10000, 8000), 14);
//! assert_eq!(levels[14], (10000, 8000));
//! assert_eq!(tile_grid(10000, 8000, 512), (20, 16));
//! ```

mod encoder;
pub mod geometry;
mod renderer;
mod service;

pub use encoder::{
    clamp_quality, is_valid_quality, ImageEncoder, JpegTileEncoder, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use geometry::{
    best_native_level, deep_zoom_dimensions, level_dimensions, max_level, plan_tile, tile_grid,
    TilePlan,
};
pub use renderer::{compose, TileRenderer, DEFAULT_TILE_SIZE};
pub use service::{SlideDescriptor, TileService};
