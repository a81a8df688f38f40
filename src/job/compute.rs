//! Client for the external compute service that runs inference jobs.
//!
//! The service exposes two JSON endpoints, both authenticated with the
//! shared `X-API-Key` header:
//!
//! ```text
//! POST   {base}/inference                {slide_id, file_extension, confidence}
//!                                        → {inference_task_id, state}
//! DELETE {base}/inference/tasks/{job}    → {state}
//! ```
//!
//! Job completion is reported back asynchronously through the webhook, see
//! [`crate::job::JobTracker::on_webhook`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::TaskState;
use crate::error::ComputeError;

/// Header carrying the shared secret in both directions.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Default deadline for starting a job.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for cancelling a job.
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSubmission {
    /// Slide id as a string, which is what the service keys its inputs by
    pub slide_id: String,
    pub file_extension: String,
    pub confidence: f64,
}

/// What the service reports for an accepted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub inference_task_id: String,
    pub state: TaskState,
}

#[derive(Debug, Deserialize)]
struct CancelReceipt {
    state: TaskState,
}

/// The compute service as seen by the job tracker.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Submit a job. The returned state is usually `PENDING`.
    async fn submit(&self, submission: &InferenceSubmission)
        -> Result<SubmissionReceipt, ComputeError>;

    /// Cancel a job and return the state the service reports afterwards.
    async fn cancel(&self, job_id: &str) -> Result<TaskState, ComputeError>;
}

// =============================================================================
// HTTP client
// =============================================================================

/// [`ComputeService`] over HTTP.
#[derive(Clone)]
pub struct HttpComputeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    start_timeout: Duration,
    cancel_timeout: Duration,
}

impl HttpComputeClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            start_timeout: DEFAULT_START_TIMEOUT,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, start: Duration, cancel: Duration) -> Self {
        self.start_timeout = start;
        self.cancel_timeout = cancel;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn cancel_url(&self, job_id: &str) -> String {
        format!(
            "{}/inference/tasks/{}",
            self.base_url,
            urlencoding::encode(job_id)
        )
    }
}

/// Map a transport-level failure, distinguishing deadline expiry.
fn transport_error(operation: &'static str, err: reqwest::Error) -> ComputeError {
    if err.is_timeout() {
        ComputeError::Timeout { operation }
    } else {
        ComputeError::Transport(err.to_string())
    }
}

/// Map a failure while reading a JSON body.
fn decode_error(operation: &'static str, err: reqwest::Error) -> ComputeError {
    if err.is_timeout() {
        ComputeError::Timeout { operation }
    } else {
        ComputeError::InvalidResponse(err.to_string())
    }
}

/// Fail on non-2xx, keeping the body for diagnostics.
async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ComputeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .map_err(|e| transport_error(operation, e))?;
    Err(ComputeError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ComputeService for HttpComputeClient {
    async fn submit(
        &self,
        submission: &InferenceSubmission,
    ) -> Result<SubmissionReceipt, ComputeError> {
        const OPERATION: &str = "start";

        let response = self
            .client
            .post(format!("{}/inference", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.start_timeout)
            .json(submission)
            .send()
            .await
            .map_err(|e| transport_error(OPERATION, e))?;

        let receipt: SubmissionReceipt = check_status(OPERATION, response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(OPERATION, e))?;

        debug!(
            slide_id = %submission.slide_id,
            job_id = %receipt.inference_task_id,
            state = %receipt.state,
            "compute job submitted"
        );
        Ok(receipt)
    }

    async fn cancel(&self, job_id: &str) -> Result<TaskState, ComputeError> {
        const OPERATION: &str = "cancel";

        let response = self
            .client
            .delete(self.cancel_url(job_id))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.cancel_timeout)
            .send()
            .await
            .map_err(|e| transport_error(OPERATION, e))?;

        let receipt: CancelReceipt = check_status(OPERATION, response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(OPERATION, e))?;

        debug!(job_id, state = %receipt.state, "compute job cancelled");
        Ok(receipt.state)
    }
}
