//! Slide access layer.
//!
//! Opening and caching of locally materialized slide files.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! └────────────────────┬────────────────────┘
//!                      │ local path
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             PyramidCache                │
//! │  (TTL + LRU, single-flight loads)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          ImageDecoder Trait             │
//! │  (opens a file into a SlideHandle)      │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//!            ┌─────────────────┐
//!            │  RasterDecoder  │
//!            │ (image crate)   │
//!            └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use wsi_gateway::slide::{PyramidCache, RasterDecoder};
//!
//! let cache = PyramidCache::new(Arc::new(RasterDecoder::new()));
//!
//! let info = cache.get_or_load(Path::new("/data/slides/7.tiff")).await?;
//! println!("{}x{}, {} Deep Zoom levels", info.width, info.height, info.level_count());
//! ```

mod cache;
mod decoder;
mod raster;

pub use cache::{
    CacheStats, PyramidCache, SlideInfo, DEFAULT_METADATA_CAPACITY, DEFAULT_METADATA_TTL,
};
pub use decoder::{ImageDecoder, SlideHandle};
pub use raster::{RasterDecoder, RasterSlide, DEFAULT_LEVEL_FACTOR, DEFAULT_MIN_LEVEL_EDGE};
