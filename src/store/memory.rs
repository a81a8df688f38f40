use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use super::{
    ActiveUpdate, SlideCatalog, SlideId, SlideRecord, TaskFilter, TaskId, TaskStore,
    TaskTransition, TaskUpdate, UserId,
};
use crate::error::StoreError;
use crate::job::{NewTask, Task};

/// In-process record store.
///
/// Ids are assigned in insertion order, so "newest first" is descending id.
#[derive(Default)]
pub struct MemoryStore {
    slides: RwLock<BTreeMap<SlideId, SlideRecord>>,
    tasks: RwLock<BTreeMap<TaskId, Task>>,
    next_task_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slides(slides: impl IntoIterator<Item = SlideRecord>) -> Self {
        let slides = slides.into_iter().map(|slide| (slide.id, slide)).collect();
        Self {
            slides: RwLock::new(slides),
            ..Self::default()
        }
    }

    /// Load slide records from a JSON array file.
    pub async fn load_catalog(path: &Path) -> Result<Self, StoreError> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            StoreError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let slides: Vec<SlideRecord> = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), slides = slides.len(), "Loaded slide catalog");
        Ok(Self::with_slides(slides))
    }

    pub async fn add_slide(&self, slide: SlideRecord) {
        self.slides.write().await.insert(slide.id, slide);
    }
}

fn apply(task: &mut Task, update: TaskUpdate) -> TaskTransition {
    let previous = task.state;
    task.state = update.state;
    task.message = update.message;
    task.completed_at = update.completed_at;
    TaskTransition {
        previous,
        task: task.clone(),
    }
}

#[async_trait]
impl SlideCatalog for MemoryStore {
    async fn get_slide(
        &self,
        id: SlideId,
        owner: UserId,
    ) -> Result<Option<SlideRecord>, StoreError> {
        let slides = self.slides.read().await;
        Ok(slides.get(&id).filter(|s| s.owner_id == owner).cloned())
    }

    async fn list_slides(&self, owner: UserId) -> Result<Vec<SlideRecord>, StoreError> {
        let slides = self.slides.read().await;
        Ok(slides
            .values()
            .filter(|s| s.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn remove_slide(&self, id: SlideId, owner: UserId) -> Result<bool, StoreError> {
        let mut slides = self.slides.write().await;
        match slides.get(&id) {
            Some(slide) if slide.owner_id == owner => {
                slides.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed) + 1;
        let task = Task {
            id,
            inference_task_id: new.inference_task_id,
            slide_id: new.slide_id,
            owner_id: new.owner_id,
            state: new.state,
            confidence: new.confidence,
            message: new.message,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.tasks.write().await.insert(id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: TaskId, owner: UserId) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id).filter(|t| t.owner_id == owner).cloned())
    }

    async fn list_tasks(
        &self,
        owner: UserId,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        let matching = tasks
            .values()
            .rev()
            .filter(|t| t.owner_id == owner)
            .filter(|t| filter.state.map_or(true, |state| t.state == state))
            .filter(|t| filter.slide_id.map_or(true, |slide| t.slide_id == slide))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn update_active_task(
        &self,
        id: TaskId,
        owner: UserId,
        update: TaskUpdate,
    ) -> Result<Option<ActiveUpdate>, StoreError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks
            .get_mut(&id)
            .filter(|t| t.owner_id == owner)
            .map(|task| {
                if task.state.is_terminal() {
                    ActiveUpdate::Terminal(task.clone())
                } else {
                    ActiveUpdate::Applied(apply(task, update))
                }
            }))
    }

    async fn update_task_by_job(
        &self,
        job_id: &str,
        update: TaskUpdate,
    ) -> Result<Option<TaskTransition>, StoreError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks
            .values_mut()
            .find(|t| t.inference_task_id == job_id)
            .map(|task| apply(task, update)))
    }
}
