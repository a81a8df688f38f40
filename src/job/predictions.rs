//! Prediction overlays for finished jobs.
//!
//! A successful job leaves `{results_prefix}/{job_id}.json` in the object
//! store:
//!
//! ```json
//! {"continuous_segments": [
//!     {"polygon": [[x, y], ...], "class_name": "tumor", "score": 0.93, "area": 1520.0}
//! ]}
//! ```
//!
//! The overlay served to viewers adds a bounding box to every segment and
//! the slide's full-resolution size, so polygons can be placed without
//! fetching the descriptor separately.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::state::TaskState;
use crate::error::JobError;
use crate::resource::{ResourceKind, ResourceMaterializer, PREDICTIONS_VARIANT};
use crate::store::{TaskId, TaskStore, UserId};
use crate::tile::TileService;

/// Score reported for segments that carry none.
pub const DEFAULT_SEGMENT_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
struct RawResults {
    #[serde(default)]
    continuous_segments: Vec<RawSegment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSegment {
    pub polygon: Vec<[f64; 2]>,
    pub class_name: String,
    pub score: Option<f64>,
    pub area: Option<f64>,
}

/// Axis-aligned bounding box in level-0 pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentBounds {
    #[serde(rename = "minX")]
    pub min_x: f64,
    #[serde(rename = "maxX")]
    pub max_x: f64,
    #[serde(rename = "minY")]
    pub min_y: f64,
    #[serde(rename = "maxY")]
    pub max_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub polygon: Vec<[f64; 2]>,
    pub class_name: String,
    pub score: f64,
    pub area: f64,
    pub bounds: SegmentBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlideDimensions {
    pub width: u32,
    pub height: u32,
}

/// Everything a viewer needs to draw a job's predictions.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOverlay {
    pub segments: Vec<Segment>,
    pub wsi_dimensions: SlideDimensions,
}

/// Bounding box of a polygon, `None` if it has no points.
pub fn polygon_bounds(polygon: &[[f64; 2]]) -> Option<SegmentBounds> {
    let (first, rest) = polygon.split_first()?;
    let start = SegmentBounds {
        min_x: first[0],
        max_x: first[0],
        min_y: first[1],
        max_y: first[1],
    };

    Some(rest.iter().fold(start, |b, [x, y]| SegmentBounds {
        min_x: b.min_x.min(*x),
        max_x: b.max_x.max(*x),
        min_y: b.min_y.min(*y),
        max_y: b.max_y.max(*y),
    }))
}

/// Attach bounds and defaults to raw segments, dropping empty polygons.
pub fn summarize_segments(raw: Vec<RawSegment>) -> Vec<Segment> {
    raw.into_iter()
        .filter_map(|segment| {
            let bounds = polygon_bounds(&segment.polygon)?;
            Some(Segment {
                polygon: segment.polygon,
                class_name: segment.class_name,
                score: segment.score.unwrap_or(DEFAULT_SEGMENT_SCORE),
                area: segment.area.unwrap_or(0.0),
                bounds,
            })
        })
        .collect()
}

/// Loads prediction overlays for successful tasks.
pub struct PredictionService {
    tasks: Arc<dyn TaskStore>,
    materializer: Arc<ResourceMaterializer>,
    tiles: Arc<TileService>,
}

impl PredictionService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        materializer: Arc<ResourceMaterializer>,
        tiles: Arc<TileService>,
    ) -> Self {
        Self {
            tasks,
            materializer,
            tiles,
        }
    }

    /// Overlay for a task the caller owns.
    ///
    /// # Errors
    ///
    /// - [`JobError::NotFound`] if the task is missing or not owned
    /// - [`JobError::InvalidState`] unless the task succeeded
    /// - [`JobError::Materialize`] if the results cannot be fetched
    /// - [`JobError::Predictions`] if the results cannot be parsed
    pub async fn predictions(
        &self,
        owner: UserId,
        task_id: TaskId,
    ) -> Result<PredictionOverlay, JobError> {
        let task = self
            .tasks
            .get_task(task_id, owner)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("Task {} not found", task_id)))?;

        if task.state != TaskState::Success {
            warn!(task_id, state = %task.state, "Predictions requested for unfinished task");
            return Err(JobError::InvalidState(format!(
                "task {} is {}, predictions need SUCCESS",
                task_id, task.state
            )));
        }

        let path = self
            .materializer
            .ensure_local(
                ResourceKind::Predictions,
                &task.inference_task_id,
                PREDICTIONS_VARIANT,
            )
            .await?;

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| JobError::Predictions(format!("{}: {}", path.display(), e)))?;
        let raw: RawResults = serde_json::from_slice(&data)
            .map_err(|e| JobError::Predictions(format!("{}: {}", path.display(), e)))?;

        let (_, info) = self.tiles.open_slide(owner, task.slide_id).await?;
        let segments = summarize_segments(raw.continuous_segments);

        info!(
            task_id,
            slide_id = task.slide_id,
            owner,
            segments = segments.len(),
            "Predictions accessed"
        );

        Ok(PredictionOverlay {
            segments,
            wsi_dimensions: SlideDimensions {
                width: info.width,
                height: info.height,
            },
        })
    }
}
