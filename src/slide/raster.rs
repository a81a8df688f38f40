//! Decoder for single-resolution raster images.
//!
//! Opens any image the `image` crate can decode (TIFF, PNG, JPEG) and builds
//! an in-memory pyramid by repeated downscaling, so that the rest of the
//! pipeline sees the same multi-level shape a native WSI decoder would
//! report. Suitable for moderate image sizes; gigapixel slides want a native
//! tiled decoder behind the same [`ImageDecoder`] trait.

use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};

use super::decoder::{ImageDecoder, SlideHandle};
use crate::error::SlideError;

/// Linear shrink factor between generated levels.
pub const DEFAULT_LEVEL_FACTOR: u32 = 4;

/// Levels stop being generated once both edges fit within this size.
pub const DEFAULT_MIN_LEVEL_EDGE: u32 = 512;

/// [`ImageDecoder`] backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct RasterDecoder {
    level_factor: u32,
    min_level_edge: u32,
}

impl RasterDecoder {
    pub fn new() -> Self {
        Self {
            level_factor: DEFAULT_LEVEL_FACTOR,
            min_level_edge: DEFAULT_MIN_LEVEL_EDGE,
        }
    }

    /// Override how the generated pyramid is shaped.
    ///
    /// A factor below 2 disables level generation.
    pub fn with_levels(mut self, level_factor: u32, min_level_edge: u32) -> Self {
        self.level_factor = level_factor;
        self.min_level_edge = min_level_edge.max(1);
        self
    }
}

impl Default for RasterDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder for RasterDecoder {
    fn open(&self, path: &Path) -> Result<Arc<dyn SlideHandle>, SlideError> {
        let open_error = |message: String| SlideError::Open {
            path: path.display().to_string(),
            message,
        };

        let mut reader = ImageReader::open(path)
            .map_err(|e| open_error(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| open_error(e.to_string()))?;
        reader.no_limits();

        let image = reader
            .decode()
            .map_err(|e| open_error(e.to_string()))?
            .into_rgb8();

        if image.width() == 0 || image.height() == 0 {
            return Err(open_error("image has no pixels".to_string()));
        }

        Ok(Arc::new(RasterSlide::from_image(
            image,
            self.level_factor,
            self.min_level_edge,
        )))
    }
}

/// A decoded image with its generated lower-resolution levels.
pub struct RasterSlide {
    levels: Vec<RgbImage>,
    downsamples: Vec<f64>,
    /// Per-axis level-0 to level scale, used to place reads
    scales: Vec<(f64, f64)>,
}

impl RasterSlide {
    pub fn from_image(image: RgbImage, level_factor: u32, min_level_edge: u32) -> Self {
        let (width, height) = image.dimensions();
        let mut levels = vec![image];
        let mut downsamples = vec![1.0];
        let mut scales = vec![(1.0, 1.0)];

        if level_factor >= 2 {
            loop {
                let last = &levels[levels.len() - 1];
                if last.width() <= min_level_edge && last.height() <= min_level_edge {
                    break;
                }
                let next_w = last.width().div_ceil(level_factor);
                let next_h = last.height().div_ceil(level_factor);
                if next_w == last.width() && next_h == last.height() {
                    break;
                }

                let next = imageops::resize(last, next_w, next_h, FilterType::Triangle);
                let scale = (width as f64 / next_w as f64, height as f64 / next_h as f64);
                levels.push(next);
                // Reported like OpenSlide: mean of the per-axis ratios
                downsamples.push((scale.0 + scale.1) / 2.0);
                scales.push(scale);
            }
        }

        Self {
            levels,
            downsamples,
            scales,
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

impl SlideHandle for RasterSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.levels[0].dimensions()
    }

    fn level_downsamples(&self) -> Vec<f64> {
        self.downsamples.clone()
    }

    fn read_region(
        &self,
        x: u32,
        y: u32,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, SlideError> {
        let source = self.levels.get(level).ok_or(SlideError::NoSuchLevel {
            level,
            levels: self.levels.len(),
        })?;
        if width == 0 || height == 0 {
            return Err(SlideError::Read(format!(
                "empty region {}x{} requested",
                width, height
            )));
        }

        let (scale_x, scale_y) = self.scales[level];
        let level_x = (x as f64 / scale_x).floor() as u32;
        let level_y = (y as f64 / scale_y).floor() as u32;

        let mut region = RgbImage::new(width, height);
        let (source_w, source_h) = source.dimensions();
        if level_x < source_w && level_y < source_h {
            let visible = imageops::crop_imm(
                source,
                level_x,
                level_y,
                width.min(source_w - level_x),
                height.min(source_h - level_y),
            )
            .to_image();
            imageops::replace(&mut region, &visible, 0, 0);
        }

        Ok(region)
    }
}
