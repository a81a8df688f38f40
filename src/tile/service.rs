//! Tile Service for orchestrating tile generation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Look up slide     3. Open via metadata cache        │    │
//! │  │  2. Materialize file  4. Render on blocking worker      │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │        │                  │                   │                 │
//! │        ▼                  ▼                   ▼                 │
//! │  ┌────────────┐  ┌─────────────────────┐  ┌──────────────┐      │
//! │  │SlideCatalog│  │ResourceMaterializer │  │ PyramidCache │      │
//! │  └────────────┘  └─────────────────────┘  └──────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::TileError;
use crate::resource::{ResourceKind, ResourceMaterializer};
use crate::slide::{PyramidCache, SlideInfo};
use crate::store::{SlideCatalog, SlideId, SlideRecord, UserId};

use super::renderer::TileRenderer;

/// Everything a Deep Zoom descriptor needs.
#[derive(Debug, Clone, Serialize)]
pub struct SlideDescriptor {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub overlap: u32,
    pub format: &'static str,
    pub levels: usize,
}

/// Serves tiles and descriptors for slides owned by the caller.
///
/// # Example
///
/// ```ignore
/// use wsi_gateway::tile::TileService;
///
/// let service = TileService::new(catalog, materializer, cache, renderer);
///
/// let descriptor = service.describe(user_id, 42).await?;
/// let jpeg = service.get_tile(user_id, 42, descriptor.levels - 1, 0, 0).await?;
/// ```
pub struct TileService {
    catalog: Arc<dyn SlideCatalog>,
    materializer: Arc<ResourceMaterializer>,
    cache: Arc<PyramidCache>,
    renderer: TileRenderer,
}

impl TileService {
    pub fn new(
        catalog: Arc<dyn SlideCatalog>,
        materializer: Arc<ResourceMaterializer>,
        cache: Arc<PyramidCache>,
        renderer: TileRenderer,
    ) -> Self {
        Self {
            catalog,
            materializer,
            cache,
            renderer,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.renderer.tile_size()
    }

    /// MIME type of rendered tiles.
    pub fn content_type(&self) -> &'static str {
        self.renderer.encoder().content_type()
    }

    /// File extension of rendered tiles.
    pub fn extension(&self) -> &'static str {
        self.renderer.encoder().extension()
    }

    pub fn cache(&self) -> &Arc<PyramidCache> {
        &self.cache
    }

    pub fn materializer(&self) -> &Arc<ResourceMaterializer> {
        &self.materializer
    }

    async fn slide_record(
        &self,
        owner: UserId,
        slide_id: SlideId,
    ) -> Result<SlideRecord, TileError> {
        self.catalog
            .get_slide(slide_id, owner)
            .await?
            .ok_or(TileError::SlideNotFound { slide_id })
    }

    /// Look up, materialize and open a slide the caller owns.
    ///
    /// # Errors
    ///
    /// - [`TileError::SlideNotFound`] if the slide is missing or owned by someone else
    /// - [`TileError::Materialize`] if the file cannot be brought local
    /// - [`TileError::Slide`] if the file cannot be decoded
    pub async fn open_slide(
        &self,
        owner: UserId,
        slide_id: SlideId,
    ) -> Result<(SlideRecord, Arc<SlideInfo>), TileError> {
        let record = self.slide_record(owner, slide_id).await?;

        let path = self
            .materializer
            .ensure_local(ResourceKind::Slide, &slide_id.to_string(), &record.extension)
            .await?;

        let info = self.cache.get_or_load(&path).await?;
        Ok((record, info))
    }

    /// Deep Zoom descriptor fields for a slide.
    pub async fn describe(
        &self,
        owner: UserId,
        slide_id: SlideId,
    ) -> Result<SlideDescriptor, TileError> {
        let (_, info) = self.open_slide(owner, slide_id).await?;

        Ok(SlideDescriptor {
            width: info.width,
            height: info.height,
            tile_size: self.tile_size(),
            overlap: 0,
            format: self.extension(),
            levels: info.level_count(),
        })
    }

    /// Render tile `(level, col, row)` of a slide.
    ///
    /// Rendering runs on a blocking worker and holds its own reference to
    /// the opened slide.
    pub async fn get_tile(
        &self,
        owner: UserId,
        slide_id: SlideId,
        level: usize,
        col: u32,
        row: u32,
    ) -> Result<Bytes, TileError> {
        let (_, info) = self.open_slide(owner, slide_id).await?;

        let renderer = self.renderer.clone();
        let data =
            tokio::task::spawn_blocking(move || renderer.render_tile(&info, level, col, row))
                .await
                .map_err(|e| TileError::Internal(format!("tile render task failed: {}", e)))??;

        debug!(slide_id, level, col, row, bytes = data.len(), "rendered tile");
        Ok(data)
    }

    /// Slides owned by the caller.
    pub async fn list_slides(&self, owner: UserId) -> Result<Vec<SlideRecord>, TileError> {
        Ok(self.catalog.list_slides(owner).await?)
    }

    /// Delete a slide everywhere it lives: remote object, local copy, cached
    /// metadata and catalog record.
    pub async fn delete_slide(
        &self,
        owner: UserId,
        slide_id: SlideId,
    ) -> Result<SlideRecord, TileError> {
        let record = self.slide_record(owner, slide_id).await?;
        let id = slide_id.to_string();

        let removed_remote = self
            .materializer
            .delete_remote(ResourceKind::Slide, &id, &record.extension)
            .await?;

        let removed_local = self
            .materializer
            .discard_local(ResourceKind::Slide, &id, &record.extension)
            .await?;

        let local_path = self
            .materializer
            .layout()
            .local_path(ResourceKind::Slide, &id, &record.extension);
        self.cache.evict(&local_path).await;

        self.catalog.remove_slide(slide_id, owner).await?;

        info!(slide_id, owner, removed_remote, removed_local, "Deleted slide");
        Ok(record)
    }
}
