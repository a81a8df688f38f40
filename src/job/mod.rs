//! Inference job lifecycle.
//!
//! - [`JobTracker`]: start, cancel, webhook reconciliation and task reads
//! - [`ComputeService`]: the external compute service, with an HTTP client
//!   in [`HttpComputeClient`]
//! - [`PredictionService`]: overlays built from a finished job's results

mod compute;
mod predictions;
mod state;
mod tracker;
mod webhook;

pub use compute::{
    ComputeService, HttpComputeClient, InferenceSubmission, SubmissionReceipt, API_KEY_HEADER,
    DEFAULT_CANCEL_TIMEOUT, DEFAULT_START_TIMEOUT,
};
pub use predictions::{
    polygon_bounds, summarize_segments, PredictionOverlay, PredictionService, RawSegment, Segment,
    SegmentBounds, SlideDimensions, DEFAULT_SEGMENT_SCORE,
};
pub use state::{NewTask, Task, TaskState, UnknownTaskState};
pub use tracker::{
    JobTracker, TaskAction, DEFAULT_CONFIDENCE, DEFAULT_TASK_LIMIT, MAX_CONFIDENCE, MAX_TASK_LIMIT,
};
pub use webhook::{SharedSecret, WebhookAck, WebhookNotice, STATUS_UPDATED_MESSAGE};
