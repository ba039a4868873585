//! Effects produced by phase transitions

use std::time::Duration;

/// Effects to be executed by the session after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Speak a fixed line to the caller
    Speak { text: String },

    /// Stay quiet for `delay`, then grade the whole transcript and speak the result
    ScheduleGrading { delay: Duration },

    /// End the call once the reply has been played
    Hangup,
}

impl Effect {
    pub fn speak(text: impl Into<String>) -> Self {
        Effect::Speak { text: text.into() }
    }
}
