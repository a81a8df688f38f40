//! Job lifecycle tracking.
//!
//! A task record mirrors a job running on the compute service. It changes in
//! two ways:
//!
//! - synchronously, when the caller starts or cancels a job and the compute
//!   service answers
//! - asynchronously, when the compute service posts a webhook
//!
//! ```text
//!            start                webhook / cancel
//!   (none) ────────► PENDING ──► STARTED ──► SUCCESS | FAILURE | REVOKED
//! ```
//!
//! Webhooks are applied in arrival order, whatever the current state.
//! Leaving a terminal state is allowed but logged. A cancel never overwrites
//! a terminal state, including one a webhook wrote while the compute
//! service was answering.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::compute::{ComputeService, InferenceSubmission};
use super::state::{NewTask, Task, TaskState};
use super::webhook::{SharedSecret, WebhookAck, WebhookNotice, STATUS_UPDATED_MESSAGE};
use crate::error::JobError;
use crate::single_flight::{FlightAborted, SingleFlight};
use crate::store::{
    ActiveUpdate, SlideCatalog, SlideId, TaskFilter, TaskId, TaskStore, TaskUpdate, UserId,
};

/// Confidence threshold used when the caller gives none.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Highest accepted confidence threshold.
pub const MAX_CONFIDENCE: f64 = 0.9;

/// Default page size for task listings.
pub const DEFAULT_TASK_LIMIT: usize = 20;

/// Largest page size for task listings.
pub const MAX_TASK_LIMIT: usize = 100;

const QUEUED_MESSAGE: &str = "Inference task queued";
const CANCELLED_MESSAGE: &str = "Inference task cancelled";

impl From<FlightAborted> for JobError {
    fn from(aborted: FlightAborted) -> Self {
        JobError::UpstreamError(format!(
            "cancel of task {} ended before reporting a result",
            aborted.key
        ))
    }
}

/// Result of a start or cancel.
#[derive(Debug, Clone, Serialize)]
pub struct TaskAction {
    pub id: TaskId,
    pub state: TaskState,
    pub message: String,
}

/// Reconciles task records with the compute service.
pub struct JobTracker {
    tasks: Arc<dyn TaskStore>,
    catalog: Arc<dyn SlideCatalog>,
    compute: Arc<dyn ComputeService>,
    secret: SharedSecret,
    cancels: SingleFlight<TaskAction, JobError>,
}

impl JobTracker {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        catalog: Arc<dyn SlideCatalog>,
        compute: Arc<dyn ComputeService>,
        secret: SharedSecret,
    ) -> Self {
        Self {
            tasks,
            catalog,
            compute,
            secret,
            cancels: SingleFlight::new(),
        }
    }

    /// Submit a job for a slide the caller owns and record it.
    ///
    /// # Errors
    ///
    /// - [`JobError::InvalidConfidence`] outside `[0.0, 0.9]`
    /// - [`JobError::NotFound`] if the slide is missing or not owned
    /// - [`JobError::UpstreamTimeout`] / [`JobError::UpstreamError`] if the
    ///   compute service fails; nothing is recorded
    pub async fn start(
        &self,
        owner: UserId,
        slide_id: SlideId,
        confidence: Option<f64>,
    ) -> Result<TaskAction, JobError> {
        let confidence = confidence.unwrap_or(DEFAULT_CONFIDENCE);
        if !(0.0..=MAX_CONFIDENCE).contains(&confidence) {
            return Err(JobError::InvalidConfidence(confidence));
        }

        let slide = self
            .catalog
            .get_slide(slide_id, owner)
            .await?
            .ok_or_else(|| {
                warn!(slide_id, owner, "Inference requested for unknown slide");
                JobError::NotFound(format!("Slide {} not found", slide_id))
            })?;

        let receipt = self
            .compute
            .submit(&InferenceSubmission {
                slide_id: slide_id.to_string(),
                file_extension: slide.extension,
                confidence,
            })
            .await?;

        let task = self
            .tasks
            .insert_task(NewTask {
                inference_task_id: receipt.inference_task_id,
                slide_id,
                owner_id: owner,
                state: receipt.state,
                confidence,
                message: QUEUED_MESSAGE.to_string(),
            })
            .await?;

        info!(
            task_id = task.id,
            job_id = %task.inference_task_id,
            slide_id,
            owner,
            confidence,
            "Inference task created"
        );

        Ok(TaskAction {
            id: task.id,
            state: task.state,
            message: task.message,
        })
    }

    /// Cancel a task the caller owns.
    ///
    /// Terminal tasks are reported as they are without contacting the
    /// compute service. Concurrent cancels of one task share a single
    /// upstream call. If the compute service fails, the record is left
    /// unchanged.
    pub async fn cancel(&self, owner: UserId, task_id: TaskId) -> Result<TaskAction, JobError> {
        let task = self.owned_task(owner, task_id).await?;

        if task.state.is_terminal() {
            return Ok(already_terminal(&task));
        }

        let tasks = self.tasks.clone();
        let compute = self.compute.clone();
        self.cancels
            .run(&task_id.to_string(), move || revoke(tasks, compute, task))
            .await
    }

    /// Apply a status notification from the compute service.
    ///
    /// The secret is checked before anything else is looked at.
    pub async fn on_webhook(
        &self,
        presented_secret: Option<&str>,
        notice: WebhookNotice,
    ) -> Result<WebhookAck, JobError> {
        if !self.secret.verify(presented_secret) {
            warn!("Rejected webhook with missing or invalid API key");
            return Err(JobError::Unauthorized);
        }

        let state: TaskState = notice
            .state
            .parse()
            .map_err(|_| JobError::InvalidState(notice.state.clone()))?;

        let received_at = Utc::now();
        let update = TaskUpdate {
            state,
            message: notice.message,
            completed_at: Some(received_at),
        };

        let transition = self
            .tasks
            .update_task_by_job(&notice.inference_task_id, update)
            .await?
            .ok_or_else(|| {
                JobError::NotFound(format!(
                    "No task for inference job {}",
                    notice.inference_task_id
                ))
            })?;

        if transition.previous.is_terminal() && transition.previous != state {
            warn!(
                task_id = transition.task.id,
                job_id = %notice.inference_task_id,
                from = %transition.previous,
                to = %state,
                "Webhook moved task out of a terminal state"
            );
        }

        info!(
            task_id = transition.task.id,
            job_id = %notice.inference_task_id,
            state = %state,
            "Webhook received"
        );

        Ok(WebhookAck {
            inference_task_id: notice.inference_task_id,
            state: state.as_str().to_string(),
            message: STATUS_UPDATED_MESSAGE.to_string(),
            received_at,
        })
    }

    /// A task the caller owns.
    pub async fn get_task(&self, owner: UserId, task_id: TaskId) -> Result<Task, JobError> {
        self.owned_task(owner, task_id).await
    }

    /// Tasks the caller owns, newest first.
    ///
    /// `state` must name a task state. `limit` is clamped to `1..=100` and
    /// defaults to 20.
    pub async fn list_tasks(
        &self,
        owner: UserId,
        state: Option<&str>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Task>, JobError> {
        let state = state
            .map(|s| s.parse::<TaskState>())
            .transpose()
            .map_err(|e| JobError::InvalidState(e.0))?;

        let filter = TaskFilter {
            state,
            slide_id: None,
            limit: Some(limit.unwrap_or(DEFAULT_TASK_LIMIT).clamp(1, MAX_TASK_LIMIT)),
            offset: offset.unwrap_or(0),
        };

        Ok(self.tasks.list_tasks(owner, &filter).await?)
    }

    /// Every task the caller ran on one of their slides, newest first.
    pub async fn slide_tasks(
        &self,
        owner: UserId,
        slide_id: SlideId,
    ) -> Result<Vec<Task>, JobError> {
        if self.catalog.get_slide(slide_id, owner).await?.is_none() {
            return Err(JobError::NotFound(format!("Slide {} not found", slide_id)));
        }

        let filter = TaskFilter {
            slide_id: Some(slide_id),
            ..TaskFilter::default()
        };
        Ok(self.tasks.list_tasks(owner, &filter).await?)
    }

    async fn owned_task(&self, owner: UserId, task_id: TaskId) -> Result<Task, JobError> {
        self.tasks
            .get_task(task_id, owner)
            .await?
            .ok_or_else(|| task_not_found(task_id))
    }
}

/// Cancel upstream, then record the outcome unless the task finished in
/// the meantime.
async fn revoke(
    tasks: Arc<dyn TaskStore>,
    compute: Arc<dyn ComputeService>,
    task: Task,
) -> Result<TaskAction, JobError> {
    let state = compute.cancel(&task.inference_task_id).await?;

    let update = TaskUpdate {
        state,
        message: CANCELLED_MESSAGE.to_string(),
        completed_at: Some(Utc::now()),
    };
    let outcome = tasks
        .update_active_task(task.id, task.owner_id, update)
        .await?
        .ok_or_else(|| task_not_found(task.id))?;

    match outcome {
        ActiveUpdate::Applied(_) => {
            info!(
                task_id = task.id,
                slide_id = task.slide_id,
                owner = task.owner_id,
                state = %state,
                "Inference task cancelled"
            );
            Ok(TaskAction {
                id: task.id,
                state,
                message: CANCELLED_MESSAGE.to_string(),
            })
        }
        ActiveUpdate::Terminal(current) => {
            info!(
                task_id = task.id,
                state = %current.state,
                "Task finished while its cancel was in flight"
            );
            Ok(already_terminal(&current))
        }
    }
}

fn already_terminal(task: &Task) -> TaskAction {
    TaskAction {
        id: task.id,
        state: task.state,
        message: format!("Task already {}", task.state.as_lowercase()),
    }
}

fn task_not_found(task_id: TaskId) -> JobError {
    JobError::NotFound(format!("Task {} not found", task_id))
}
