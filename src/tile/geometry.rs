//! Deep Zoom pyramid geometry.
//!
//! Deep Zoom numbers levels from the smallest image upwards:
//!
//! ```text
//! level 0          1 x 1
//! level 1          2 x 2  (or less)
//! ...
//! level max        width x height      max = ceil(log2(max(width, height)))
//! ```
//!
//! Level `L` has dimensions `ceil(width / 2^(max - L)) x ceil(height / 2^(max - L))`.
//!
//! A slide's *native* pyramid (what the decoder exposes) is unrelated to
//! this grid. [`plan_tile`] maps one Deep Zoom tile back onto the native
//! level that can serve it most cheaply.

use crate::error::TileError;

/// Highest Deep Zoom level for an image: `ceil(log2(max(width, height)))`.
pub fn max_level(width: u32, height: u32) -> usize {
    let max_dim = width.max(height);
    if max_dim <= 1 {
        return 0;
    }
    // Bit length of (n - 1) is ceil(log2(n)) for n >= 2
    (u32::BITS - (max_dim - 1).leading_zeros()) as usize
}

/// Dimensions of Deep Zoom level `level` given the top level `max`.
pub fn level_dimensions(width: u32, height: u32, level: usize, max: usize) -> (u32, u32) {
    let scale = 1u64 << (max - level.min(max));
    (
        (width as u64).div_ceil(scale) as u32,
        (height as u64).div_ceil(scale) as u32,
    )
}

/// Dimensions of every Deep Zoom level, index 0 being the 1x1-ish level.
pub fn deep_zoom_dimensions(width: u32, height: u32) -> Vec<(u32, u32)> {
    let max = max_level(width, height);
    (0..=max)
        .map(|level| level_dimensions(width, height, level, max))
        .collect()
}

/// Number of tile columns and rows covering a level.
pub fn tile_grid(level_width: u32, level_height: u32, tile_size: u32) -> (u32, u32) {
    (
        level_width.div_ceil(tile_size).max(1),
        level_height.div_ceil(tile_size).max(1),
    )
}

/// Pick the native level to read from for a requested scale.
///
/// Returns the level with the largest downsample that does not exceed
/// `scale`, so the read never has to be upscaled. Among equal downsamples
/// the lowest index wins. When every level is coarser than `scale`, the
/// finest level is used.
pub fn best_native_level(downsamples: &[f64], scale: f64) -> usize {
    let mut best: Option<(usize, f64)> = None;

    for (level, &downsample) in downsamples.iter().enumerate() {
        if downsample <= scale && best.map_or(true, |(_, d)| downsample > d) {
            best = Some((level, downsample));
        }
    }

    match best {
        Some((level, _)) => level,
        None => downsamples
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(level, _)| level)
            .unwrap_or(0),
    }
}

/// Everything needed to produce one Deep Zoom tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlan {
    pub level: usize,
    pub col: u32,
    pub row: u32,
    /// Visible tile content `(tw, th)`; smaller than the tile edge at the
    /// right and bottom borders
    pub extent: (u32, u32),
    /// Top-left of the source region in native level-0 pixels
    pub native_origin: (u32, u32),
    /// Size of the source region in native level-0 pixels
    pub native_size: (u32, u32),
    /// Native level chosen to read from
    pub native_level: usize,
    /// Size of the region to read, in pixels of `native_level`
    pub read_size: (u32, u32),
}

/// Compute the source region for tile `(level, col, row)`.
///
/// # Arguments
///
/// * `dimensions` - native full-resolution `(width, height)`
/// * `level_dims` - Deep Zoom level dimensions, see [`deep_zoom_dimensions`]
/// * `downsamples` - native per-level downsample factors
/// * `tile_size` - tile edge `T`
///
/// # Errors
///
/// - [`TileError::InvalidLevel`] if `level >= level_dims.len()`
/// - [`TileError::TileOutOfBounds`] if the tile origin lies outside the level
pub fn plan_tile(
    dimensions: (u32, u32),
    level_dims: &[(u32, u32)],
    downsamples: &[f64],
    tile_size: u32,
    level: usize,
    col: u32,
    row: u32,
) -> Result<TilePlan, TileError> {
    let (level_w, level_h) = *level_dims.get(level).ok_or(TileError::InvalidLevel {
        level,
        levels: level_dims.len(),
    })?;

    let x = col as u64 * tile_size as u64;
    let y = row as u64 * tile_size as u64;
    if x >= level_w as u64 || y >= level_h as u64 {
        return Err(TileError::TileOutOfBounds {
            level,
            col,
            row,
            width: level_w,
            height: level_h,
        });
    }

    let tw = (tile_size as u64).min(level_w as u64 - x) as u32;
    let th = (tile_size as u64).min(level_h as u64 - y) as u32;

    let (width, height) = dimensions;
    let scale_x = width as f64 / level_w as f64;
    let scale_y = height as f64 / level_h as f64;

    let native_x = (x as f64 * scale_x).floor() as u32;
    let native_y = (y as f64 * scale_y).floor() as u32;
    let native_w = (tw as f64 * scale_x).ceil() as u32;
    let native_h = (th as f64 * scale_y).ceil() as u32;

    let native_level = best_native_level(downsamples, scale_x.max(scale_y));
    let downsample = downsamples.get(native_level).copied().unwrap_or(1.0);

    let read_w = ((native_w as f64 / downsample).ceil() as u32).max(1);
    let read_h = ((native_h as f64 / downsample).ceil() as u32).max(1);

    Ok(TilePlan {
        level,
        col,
        row,
        extent: (tw, th),
        native_origin: (native_x, native_y),
        native_size: (native_w, native_h),
        native_level,
        read_size: (read_w, read_h),
    })
}
