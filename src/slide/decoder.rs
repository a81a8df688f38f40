use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use crate::error::SlideError;

/// An opened multi-resolution image.
///
/// Native level 0 is full resolution; each further level is smaller by the
/// factor reported in [`level_downsamples`](Self::level_downsamples).
/// Methods are synchronous and may block on disk or CPU work, so async
/// callers run them on a blocking worker.
pub trait SlideHandle: Send + Sync {
    /// Full-resolution `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Downsample factor of each native level, ascending; level 0 is `1.0`.
    fn level_downsamples(&self) -> Vec<f64>;

    /// Read a region as RGB.
    ///
    /// `(x, y)` is the top-left corner in level-0 coordinates; `width` and
    /// `height` are in pixels of `level`. Parts of the region outside the
    /// image are returned as black.
    fn read_region(
        &self,
        x: u32,
        y: u32,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, SlideError>;
}

/// Opens slide files from local storage.
pub trait ImageDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn SlideHandle>, SlideError>;
}
