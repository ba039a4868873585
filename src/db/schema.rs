//! Database schema and types

use crate::state_machine::CallPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL schema for initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS calls (
    call_sid TEXT PRIMARY KEY,
    from_number TEXT NOT NULL DEFAULT '',
    to_number TEXT NOT NULL DEFAULT '',
    phase TEXT NOT NULL DEFAULT '"greeting"',
    transcript TEXT NOT NULL DEFAULT '[]',
    feedback TEXT,
    recording_url TEXT,
    outcome TEXT NOT NULL DEFAULT 'in_progress',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_calls_created ON calls(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_calls_outcome ON calls(outcome);
"#;

/// How a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    #[default]
    InProgress,
    /// The caller heard their feedback
    Completed,
    /// The caller hung up before the role-play finished
    HungUp,
    /// No activity for the idle timeout, or the server restarted mid-call
    Abandoned,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CallOutcome::InProgress => "in_progress",
            CallOutcome::Completed => "completed",
            CallOutcome::HungUp => "hung_up",
            CallOutcome::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(CallOutcome::InProgress),
            "completed" => Ok(CallOutcome::Completed),
            "hung_up" => Ok(CallOutcome::HungUp),
            "abandoned" => Ok(CallOutcome::Abandoned),
            other => Err(format!("unknown call outcome: {other}")),
        }
    }
}

/// A persisted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_sid: String,
    pub from_number: String,
    pub to_number: String,
    pub phase: CallPhase,
    pub transcript: Vec<String>,
    pub feedback: Option<String>,
    pub recording_url: Option<String>,
    pub outcome: CallOutcome,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
