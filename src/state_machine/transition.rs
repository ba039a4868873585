//! Pure phase transition function

use super::{CallPhase, Effect, SessionContext};
use thiserror::Error;

/// Result of a phase transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_phase: CallPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: CallPhase) -> Self {
        Self {
            new_phase: phase,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// True when the transition ends the call
    pub fn is_terminal(&self) -> bool {
        self.effects.contains(&Effect::Hangup)
    }
}

/// The session has finished; no further turns are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("call session is already done and accepts no further turns")]
pub struct InvalidStateError;

/// Pure transition function.
///
/// Given the same phase, context and utterance it always produces the same
/// result, with no I/O. Every phase except `Done` has a successor.
pub fn transition(
    phase: CallPhase,
    context: &SessionContext,
    utterance: &str,
) -> Result<TransitionResult, InvalidStateError> {
    let script = &context.script;

    match phase {
        CallPhase::Greeting => Ok(TransitionResult::new(CallPhase::Ring)
            .with_effect(Effect::speak(&script.greeting))),

        CallPhase::Ring => Ok(TransitionResult::new(CallPhase::Scenario)
            .with_effect(Effect::speak(&script.ring))),

        CallPhase::Scenario => Ok(TransitionResult::new(CallPhase::Roleplay)
            .with_effect(Effect::speak(&script.scenario))),

        CallPhase::Roleplay if script.mentions_keyword(utterance) => {
            Ok(TransitionResult::new(CallPhase::ThankYou)
                .with_effect(Effect::speak(&script.goodbye)))
        }

        // Empty or off-topic answers keep the caller in the role-play
        CallPhase::Roleplay => Ok(TransitionResult::new(CallPhase::Roleplay)
            .with_effect(Effect::speak(&script.clarify))),

        CallPhase::ThankYou => Ok(TransitionResult::new(CallPhase::Waiting)
            .with_effect(Effect::speak(&script.pause))),

        CallPhase::Waiting => Ok(TransitionResult::new(CallPhase::Done)
            .with_effect(Effect::ScheduleGrading {
                delay: context.grading_delay,
            })
            .with_effect(Effect::Hangup)),

        CallPhase::Done => Err(InvalidStateError),
    }
}
