//! Inbound job notifications from the compute service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Fixed acknowledgement message.
pub const STATUS_UPDATED_MESSAGE: &str = "Task status updated";

/// Secret shared with the compute service.
///
/// An empty secret means none is configured, and every presented value is
/// rejected.
#[derive(Clone)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_configured(&self) -> bool {
        !self.0.is_empty()
    }

    /// Constant-time comparison against a presented value.
    pub fn verify(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(presented) if self.is_configured() => {
                presented.as_bytes().ct_eq(self.0.as_bytes()).into()
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedSecret").field(&"<redacted>").finish()
    }
}

/// Body of a webhook callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotice {
    pub inference_task_id: String,
    /// Raw state name; validated by the tracker
    pub state: String,
    pub message: String,
    /// Sender's clock, informational only
    pub timestamp: String,
}

/// Response to an accepted webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub inference_task_id: String,
    pub state: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
}
