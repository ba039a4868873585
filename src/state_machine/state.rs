//! Call phase and per-call context types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Quiet period between the caller's goodbye and the spoken feedback
pub const DEFAULT_GRADING_DELAY: Duration = Duration::from_secs(10);

/// Where a call is in the scripted role-play.
///
/// Phases only move forward in declaration order, except for the
/// `Roleplay` self-loop while the caller has not offered an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    #[default]
    Greeting,
    Ring,
    Scenario,
    Roleplay,
    ThankYou,
    Waiting,
    Done,
}

impl CallPhase {
    pub const ALL: [CallPhase; 7] = [
        CallPhase::Greeting,
        CallPhase::Ring,
        CallPhase::Scenario,
        CallPhase::Roleplay,
        CallPhase::ThankYou,
        CallPhase::Waiting,
        CallPhase::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CallPhase::Greeting => "greeting",
            CallPhase::Ring => "ring",
            CallPhase::Scenario => "scenario",
            CallPhase::Roleplay => "roleplay",
            CallPhase::ThankYou => "thank_you",
            CallPhase::Waiting => "waiting",
            CallPhase::Done => "done",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallPhase::Done)
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lines EVA speaks, and the phrase that ends the role-play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub greeting: String,
    pub ring: String,
    pub scenario: String,
    pub clarify: String,
    pub goodbye: String,
    /// Spoken while the caller settles before feedback
    pub pause: String,
    /// Feedback used when no grader is configured or grading fails
    pub static_feedback: String,
    /// Case-insensitive substring that moves `Roleplay` to `ThankYou`
    pub keyword: String,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: "Hi, this is EVA. Are you ready to test your incoming call skills?".to_string(),
            ring: "Ring ring.".to_string(),
            scenario: "Hi, I\u{2019}ve never been there before. My check engine light just came on. What do I need to do?"
                .to_string(),
            clarify: "Can you help me understand what I need to do next?".to_string(),
            goodbye: "Thank you, goodbye.".to_string(),
            pause: "...".to_string(),
            static_feedback:
                "Thanks for completing the roleplay! You did a great job. Keep practicing!".to_string(),
            keyword: "appointment".to_string(),
        }
    }
}

impl Script {
    /// True when the utterance contains the keyword, ignoring case and word boundaries
    pub fn mentions_keyword(&self, utterance: &str) -> bool {
        utterance
            .to_lowercase()
            .contains(&self.keyword.to_lowercase())
    }
}

/// Immutable per-call context
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub call_sid: String,
    pub script: Arc<Script>,
    pub grading_delay: Duration,
}

impl SessionContext {
    pub fn new(call_sid: impl Into<String>, script: Arc<Script>, grading_delay: Duration) -> Self {
        Self {
            call_sid: call_sid.into(),
            script,
            grading_delay,
        }
    }

    /// Context with the default script and quiet period
    pub fn with_defaults(call_sid: impl Into<String>) -> Self {
        Self::new(call_sid, Arc::new(Script::default()), DEFAULT_GRADING_DELAY)
    }
}
