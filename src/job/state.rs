//! Task records and their lifecycle states.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{SlideId, TaskId, UserId};

/// Lifecycle state of an inference task.
///
/// ```text
/// PENDING ──► STARTED ──► SUCCESS | FAILURE | REVOKED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Started,
    Success,
    Failure,
    Revoked,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Pending,
        TaskState::Started,
        TaskState::Success,
        TaskState::Failure,
        TaskState::Revoked,
    ];

    /// SUCCESS, FAILURE and REVOKED are final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Revoked
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Revoked => "REVOKED",
        }
    }

    pub fn as_lowercase(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Started => "started",
            TaskState::Success => "success",
            TaskState::Failure => "failure",
            TaskState::Revoked => "revoked",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no [`TaskState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTaskState(pub String);

impl fmt::Display for UnknownTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown task state {:?}", self.0)
    }
}

impl std::error::Error for UnknownTaskState {}

impl FromStr for TaskState {
    type Err = UnknownTaskState;

    /// Parses the upper-case wire names only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownTaskState(s.to_string()))
    }
}

/// A persisted inference task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Job id assigned by the compute service
    pub inference_task_id: String,
    pub slide_id: SlideId,
    pub owner_id: UserId,
    pub state: TaskState,
    pub confidence: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when a task is first recorded.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub inference_task_id: String,
    pub slide_id: SlideId,
    pub owner_id: UserId,
    pub state: TaskState,
    pub confidence: f64,
    pub message: String,
}
