//! Time-bounded cache of opened slides and their pyramid geometry.
//!
//! Opening a slide means decoding headers (or, for raster images, the
//! whole file), so the result is kept for a fixed TTL keyed by local path:
//!
//! ```text
//! get_or_load(path)
//!      │
//!      ├── entry present and age <= ttl ──► Arc<SlideInfo>
//!      │
//!      └── missing or expired ──► SingleFlight[path]
//!                                      │
//!                                      ▼
//!                         spawn_blocking(decoder.open) → insert
//! ```
//!
//! The TTL is absolute from insertion; hits never extend it. Expired entries
//! are dropped lazily on lookup and by [`PyramidCache::purge_expired`].
//! Beyond `capacity`, the least recently used entry is evicted.
//!
//! Callers get an `Arc<SlideInfo>` and keep the decoder handle alive for as
//! long as they hold it, so eviction never pulls a handle out from under an
//! in-progress render.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::decoder::{ImageDecoder, SlideHandle};
use crate::error::SlideError;
use crate::single_flight::{FlightAborted, SingleFlight};
use crate::tile::geometry::deep_zoom_dimensions;

/// Default time-to-live of a cache entry (5 minutes).
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(300);

/// Default maximum number of cached slides.
pub const DEFAULT_METADATA_CAPACITY: usize = 50;

impl From<FlightAborted> for SlideError {
    fn from(aborted: FlightAborted) -> Self {
        SlideError::Open {
            path: aborted.key,
            message: "slide loader ended before reporting a result".to_string(),
        }
    }
}

// =============================================================================
// SlideInfo
// =============================================================================

/// An opened slide plus the geometry derived from it.
pub struct SlideInfo {
    pub handle: Arc<dyn SlideHandle>,
    pub width: u32,
    pub height: u32,
    /// Native pyramid downsample factors, level 0 first
    pub downsamples: Vec<f64>,
    /// Deep Zoom level dimensions, smallest level first
    pub level_dims: Vec<(u32, u32)>,
}

impl SlideInfo {
    /// Derive geometry from an opened handle.
    pub fn from_handle(handle: Arc<dyn SlideHandle>) -> Result<Self, SlideError> {
        let (width, height) = handle.dimensions();
        if width == 0 || height == 0 {
            return Err(SlideError::Read(format!(
                "slide reports empty dimensions {}x{}",
                width, height
            )));
        }

        let downsamples = handle.level_downsamples();
        if downsamples.is_empty() {
            return Err(SlideError::Read("slide reports no native levels".to_string()));
        }

        Ok(Self {
            handle,
            width,
            height,
            downsamples,
            level_dims: deep_zoom_dimensions(width, height),
        })
    }

    /// Number of Deep Zoom levels.
    pub fn level_count(&self) -> usize {
        self.level_dims.len()
    }
}

impl fmt::Debug for SlideInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlideInfo")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("downsamples", &self.downsamples)
            .field("levels", &self.level_dims.len())
            .finish()
    }
}

// =============================================================================
// PyramidCache
// =============================================================================

struct CacheEntry {
    info: Arc<SlideInfo>,
    inserted_at: Instant,
}

/// Snapshot of cache contents, for maintenance endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_seconds: u64,
    pub loads_in_flight: usize,
    pub cached_paths: Vec<String>,
}

/// TTL + LRU cache of [`SlideInfo`] keyed by local path.
pub struct PyramidCache {
    decoder: Arc<dyn ImageDecoder>,
    entries: Arc<RwLock<LruCache<PathBuf, CacheEntry>>>,
    ttl: Duration,
    loads: SingleFlight<Arc<SlideInfo>, SlideError>,
}

impl PyramidCache {
    /// Create a cache with [`DEFAULT_METADATA_CAPACITY`] and [`DEFAULT_METADATA_TTL`].
    pub fn new(decoder: Arc<dyn ImageDecoder>) -> Self {
        Self::with_settings(decoder, DEFAULT_METADATA_CAPACITY, DEFAULT_METADATA_TTL)
    }

    /// Create a cache with explicit capacity and TTL.
    ///
    /// A capacity of 0 is treated as 1.
    pub fn with_settings(decoder: Arc<dyn ImageDecoder>, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            decoder,
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            ttl,
            loads: SingleFlight::new(),
        }
    }

    /// Return the cached slide for `path`, opening it on a miss or expiry.
    ///
    /// Concurrent calls for the same path share one open.
    pub async fn get_or_load(&self, path: &Path) -> Result<Arc<SlideInfo>, SlideError> {
        if let Some(info) = self.lookup(path).await {
            return Ok(info);
        }

        let key = path.to_string_lossy().into_owned();
        let decoder = Arc::clone(&self.decoder);
        let entries = Arc::clone(&self.entries);
        let path = path.to_path_buf();

        self.loads
            .run(&key, move || load(decoder, entries, path))
            .await
    }

    /// Unexpired entry for `path`, dropping it if it has expired.
    async fn lookup(&self, path: &Path) -> Option<Arc<SlideInfo>> {
        let mut entries = self.entries.write().await;

        match entries.get(path) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                return Some(Arc::clone(&entry.info));
            }
            Some(_) => {}
            None => return None,
        }

        entries.pop(path);
        debug!(path = %path.display(), "slide metadata expired");
        None
    }

    /// Drop the entry for `path`. Returns whether one was present.
    pub async fn evict(&self, path: &Path) -> bool {
        self.entries.write().await.pop(path).is_some()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;

        let expired: Vec<PathBuf> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > self.ttl)
            .map(|(path, _)| path.clone())
            .collect();

        for path in &expired {
            entries.pop(path);
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "purged expired slide metadata");
        }
        expired.len()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until the
    /// cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.purge_expired().await;
            }
        })
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            capacity: entries.cap().get(),
            ttl_seconds: self.ttl.as_secs(),
            loads_in_flight: self.loads.in_flight_count(),
            cached_paths: entries
                .iter()
                .map(|(path, _)| path.display().to_string())
                .collect(),
        }
    }
}

async fn load(
    decoder: Arc<dyn ImageDecoder>,
    entries: Arc<RwLock<LruCache<PathBuf, CacheEntry>>>,
    path: PathBuf,
) -> Result<Arc<SlideInfo>, SlideError> {
    let open_path = path.clone();
    let opened = tokio::task::spawn_blocking(move || {
        let handle = decoder.open(&open_path)?;
        SlideInfo::from_handle(handle)
    })
    .await
    .map_err(|e| SlideError::Open {
        path: path.display().to_string(),
        message: format!("slide loader failed: {}", e),
    })?;

    let info = Arc::new(opened?);
    debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        levels = info.level_count(),
        "slide opened"
    );

    entries.write().await.put(
        path,
        CacheEntry {
            info: Arc::clone(&info),
            inserted_at: Instant::now(),
        },
    );

    Ok(info)
}
