//! Slide and task records.
//!
//! The gateway does not own its records; it talks to them through the
//! [`SlideCatalog`] and [`TaskStore`] traits. Every lookup is scoped by the
//! owning user, and a record owned by someone else is indistinguishable from
//! a missing one.
//!
//! [`MemoryStore`] implements both traits in process and can be seeded from
//! a JSON slide catalog.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::job::{NewTask, Task, TaskState};

pub use memory::MemoryStore;

pub type UserId = u64;
pub type SlideId = u64;
pub type TaskId = u64;

/// A stored slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRecord {
    pub id: SlideId,
    pub owner_id: UserId,
    pub name: String,
    /// File extension without the dot, e.g. `svs`
    pub extension: String,
}

/// Read and delete access to slide records.
#[async_trait]
pub trait SlideCatalog: Send + Sync {
    /// The slide if it exists and is owned by `owner`.
    async fn get_slide(&self, id: SlideId, owner: UserId)
        -> Result<Option<SlideRecord>, StoreError>;

    /// Every slide owned by `owner`, by ascending id.
    async fn list_slides(&self, owner: UserId) -> Result<Vec<SlideRecord>, StoreError>;

    /// Remove the slide if owned by `owner`. Returns whether it was removed.
    async fn remove_slide(&self, id: SlideId, owner: UserId) -> Result<bool, StoreError>;
}

/// Listing filter for [`TaskStore::list_tasks`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub slide_id: Option<SlideId>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Fields changed by a task update.
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub state: TaskState,
    pub message: String,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Outcome of an update: the state before it and the record after it.
#[derive(Debug, Clone)]
pub struct TaskTransition {
    pub previous: TaskState,
    pub task: Task,
}

/// Outcome of [`TaskStore::update_active_task`].
#[derive(Debug, Clone)]
pub enum ActiveUpdate {
    Applied(TaskTransition),
    /// The task had reached a terminal state; nothing was written
    Terminal(Task),
}

/// Persistence for inference tasks.
///
/// Each update is applied as a single read-modify-write.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError>;

    /// The task if it exists and is owned by `owner`.
    async fn get_task(&self, id: TaskId, owner: UserId) -> Result<Option<Task>, StoreError>;

    /// Tasks owned by `owner` matching `filter`, newest first.
    async fn list_tasks(&self, owner: UserId, filter: &TaskFilter)
        -> Result<Vec<Task>, StoreError>;

    /// Update a task the caller owns unless it is already terminal.
    ///
    /// The state check and the write happen under one lock. `None` if there
    /// is no such task.
    async fn update_active_task(
        &self,
        id: TaskId,
        owner: UserId,
        update: TaskUpdate,
    ) -> Result<Option<ActiveUpdate>, StoreError>;

    /// Update the task carrying compute job id `job_id`, whoever owns it.
    async fn update_task_by_job(
        &self,
        job_id: &str,
        update: TaskUpdate,
    ) -> Result<Option<TaskTransition>, StoreError>;
}
