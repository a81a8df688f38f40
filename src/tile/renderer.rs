//! Deep Zoom tile rendering.
//!
//! ```text
//! plan_tile ──► read_region ──► resize to (tw, th) ──► pad to T×T ──► encode
//! ```
//!
//! Rendering is synchronous and CPU bound; async callers run it on a
//! blocking worker.

use std::sync::Arc;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::encoder::ImageEncoder;
use super::geometry::{plan_tile, TilePlan};
use crate::error::TileError;
use crate::slide::SlideInfo;

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Renders fixed-size tiles from an opened slide.
#[derive(Clone)]
pub struct TileRenderer {
    tile_size: u32,
    encoder: Arc<dyn ImageEncoder>,
}

impl TileRenderer {
    /// Create a renderer. A tile size of 0 is treated as 1.
    pub fn new(tile_size: u32, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self {
            tile_size: tile_size.max(1),
            encoder,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn encoder(&self) -> &dyn ImageEncoder {
        self.encoder.as_ref()
    }

    /// Plan tile `(level, col, row)` against `info` without reading pixels.
    pub fn plan(
        &self,
        info: &SlideInfo,
        level: usize,
        col: u32,
        row: u32,
    ) -> Result<TilePlan, TileError> {
        plan_tile(
            (info.width, info.height),
            &info.level_dims,
            &info.downsamples,
            self.tile_size,
            level,
            col,
            row,
        )
    }

    /// Render and encode tile `(level, col, row)`.
    ///
    /// # Errors
    ///
    /// - [`TileError::InvalidLevel`] / [`TileError::TileOutOfBounds`] from planning
    /// - [`TileError::Slide`] if the region read fails
    /// - [`TileError::EncodeError`] if encoding fails
    pub fn render_tile(
        &self,
        info: &SlideInfo,
        level: usize,
        col: u32,
        row: u32,
    ) -> Result<Bytes, TileError> {
        let plan = self.plan(info, level, col, row)?;

        let (x, y) = plan.native_origin;
        let (read_w, read_h) = plan.read_size;
        let region = info
            .handle
            .read_region(x, y, plan.native_level, read_w, read_h)?;

        let tile = compose(region, plan.extent, self.tile_size);
        self.encoder.encode(&tile)
    }
}

/// Fit a region to the tile extent and pad it to the full tile edge.
///
/// Content sits at the top-left; the remainder is black.
pub fn compose(region: RgbImage, extent: (u32, u32), tile_size: u32) -> RgbImage {
    let (tw, th) = extent;

    let content = if region.dimensions() == extent {
        region
    } else {
        imageops::resize(&region, tw, th, FilterType::Triangle)
    };

    if extent == (tile_size, tile_size) {
        return content;
    }

    let mut tile = RgbImage::new(tile_size, tile_size);
    imageops::replace(&mut tile, &content, 0, 0);
    tile
}
