use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WebhookProcessingStatus {
    Processing,
    Completed,
    Failed,
}

impl WebhookProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookProcessingStatus::Processing => "processing",
            WebhookProcessingStatus::Completed => "completed",
            WebhookProcessingStatus::Failed => "failed",
        }
    }

    /// Anything unrecognised is treated as in-flight, never as done.
    pub fn from_str(value: &str) -> Self {
        match value {
            "completed" => WebhookProcessingStatus::Completed,
            "failed" => WebhookProcessingStatus::Failed,
            _ => WebhookProcessingStatus::Processing,
        }
    }
}

impl Display for WebhookProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
