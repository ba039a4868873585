//! Webhook forms and API response types

use crate::db::CallRecord;
use serde::{Deserialize, Serialize};

/// Incoming call (`/voice`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhook {
    pub call_sid: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// A finished `<Record>` (`/recording`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingWebhook {
    pub call_sid: String,
    /// Absent or empty when the caller stayed silent
    #[serde(default)]
    pub recording_url: Option<String>,
}

/// Redirect after the quiet period (`/feedback`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedbackWebhook {
    pub call_sid: String,
}

/// Call status callback (`/status`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusWebhook {
    pub call_sid: String,
    pub call_status: String,
}

impl StatusWebhook {
    /// Statuses after which the line is gone
    pub fn is_final(&self) -> bool {
        matches!(
            self.call_status.as_str(),
            "completed" | "canceled" | "failed" | "busy" | "no-answer"
        )
    }
}

/// Whole-call recording callback (`/recording-status`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingStatusWebhook {
    pub call_sid: String,
    pub recording_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ListCallsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CallListResponse {
    pub calls: Vec<CallRecord>,
    /// Calls with a live session right now
    pub active: usize,
}

#[derive(Debug, Serialize)]
pub struct CallResponse {
    pub call: CallRecord,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
