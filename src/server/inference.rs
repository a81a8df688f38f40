//! HTTP handlers for inference jobs.
//!
//! # Endpoints
//!
//! - `POST /inference` - Start a job for a slide
//! - `GET /inference/tasks` - List the caller's tasks
//! - `GET /inference/tasks/{task_id}` - One task
//! - `DELETE /inference/tasks/{task_id}` - Cancel a task
//! - `GET /inference/tasks/{task_id}/predictions` - Prediction overlay
//! - `GET /slides/{slide_id}/tasks` - Tasks run on one slide
//! - `POST /inference/webhook/callback` - Status updates from the compute
//!   service, authenticated with the `X-API-Key` header

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{
    PredictionOverlay, Task, TaskAction, TaskState, WebhookAck, WebhookNotice, API_KEY_HEADER,
};
use crate::store::{SlideId, TaskId};

use super::auth::Caller;
use super::handlers::{AppState, HandlerError};

/// Body of `POST /inference`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartInferenceRequest {
    pub slide_id: SlideId,

    /// Detection threshold, `0.0..=0.9`, defaults to 0.5
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Query parameters for `GET /inference/tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskListQuery {
    /// Upper-case state name, e.g. `SUCCESS`
    pub state: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A task as shown to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub slide_id: SlideId,
    pub state: TaskState,
    pub confidence: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            slide_id: task.slide_id,
            state: task.state,
            confidence: task.confidence,
            message: task.message,
            created_at: task.created_at,
            completed_at: task.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskView>,
}

pub async fn start_inference_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<StartInferenceRequest>,
) -> Result<Json<TaskAction>, HandlerError> {
    let action = state
        .tracker
        .start(caller.user_id, request.slide_id, request.confidence)
        .await?;
    Ok(Json(action))
}

pub async fn list_tasks_handler(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<TaskListResponse>, HandlerError> {
    let tasks = state
        .tracker
        .list_tasks(
            caller.user_id,
            query.state.as_deref(),
            query.limit,
            query.offset,
        )
        .await?;

    Ok(Json(TaskListResponse {
        tasks: tasks.into_iter().map(TaskView::from).collect(),
    }))
}

pub async fn get_task_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<TaskId>,
) -> Result<Json<TaskView>, HandlerError> {
    let task = state.tracker.get_task(caller.user_id, task_id).await?;
    Ok(Json(task.into()))
}

/// Cancel a task. Finished tasks are reported unchanged.
pub async fn cancel_task_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<TaskId>,
) -> Result<Json<TaskAction>, HandlerError> {
    let action = state.tracker.cancel(caller.user_id, task_id).await?;
    Ok(Json(action))
}

/// Prediction overlay of a successful task.
pub async fn predictions_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<TaskId>,
) -> Result<Json<PredictionOverlay>, HandlerError> {
    let overlay = state.predictions.predictions(caller.user_id, task_id).await?;
    Ok(Json(overlay))
}

pub async fn slide_tasks_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(slide_id): Path<SlideId>,
) -> Result<Json<TaskListResponse>, HandlerError> {
    let tasks = state.tracker.slide_tasks(caller.user_id, slide_id).await?;
    Ok(Json(TaskListResponse {
        tasks: tasks.into_iter().map(TaskView::from).collect(),
    }))
}

/// Webhook from the compute service.
///
/// Not behind user identity; the `X-API-Key` header must match the shared
/// secret.
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(notice): Json<WebhookNotice>,
) -> Result<Json<WebhookAck>, HandlerError> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let ack = state.tracker.on_webhook(presented, notice).await?;
    Ok(Json(ack))
}
