//! Per-call session: owns the phase and transcript, executes transition effects

use super::transition::{transition, InvalidStateError};
use super::{CallPhase, Effect, SessionContext};
use crate::grading::Grader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one `advance` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Text to synthesize and play to the caller
    pub reply: String,
    /// Phase after the turn
    pub phase: CallPhase,
    /// The call should end after `reply` is played
    pub terminal: bool,
}

/// Serializable view of a session, used for persistence and the call API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub call_sid: String,
    pub phase: CallPhase,
    pub transcript: Vec<String>,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_response_at: DateTime<Utc>,
    pub done: bool,
}

/// State machine for a single phone call.
///
/// Not `Sync`-shared: the call runtime owns it exclusively and serializes
/// every `advance`.
#[derive(Debug)]
pub struct CallSession {
    context: SessionContext,
    phase: CallPhase,
    transcript: Vec<String>,
    feedback: Option<String>,
    created_at: DateTime<Utc>,
    last_response_at: DateTime<Utc>,
    done: bool,
}

impl CallSession {
    pub fn new(context: SessionContext) -> Self {
        let now = Utc::now();
        Self {
            context,
            phase: CallPhase::Greeting,
            transcript: Vec::new(),
            feedback: None,
            created_at: now,
            last_response_at: now,
            done: false,
        }
    }

    /// The scripted opening line. Never mutates the session.
    pub fn initial_message(&self) -> &str {
        &self.context.script.greeting
    }

    /// Advance the call by one caller turn.
    ///
    /// `None` is the implicit first turn before the caller has spoken; it is
    /// treated as an empty utterance and is not recorded in the transcript.
    /// In `Waiting` this suspends for the quiet period before grading, so
    /// dropping the returned future abandons the pending feedback.
    pub async fn advance<G>(
        &mut self,
        utterance: Option<&str>,
        grader: &G,
    ) -> Result<Turn, InvalidStateError>
    where
        G: Grader + ?Sized,
    {
        if self.done {
            return Err(InvalidStateError);
        }

        let result = transition(self.phase, &self.context, utterance.unwrap_or_default())?;

        let mut reply = String::new();
        for effect in &result.effects {
            match effect {
                Effect::Speak { text } => reply.clone_from(text),
                Effect::ScheduleGrading { delay } => {
                    tracing::debug!(
                        call_sid = %self.context.call_sid,
                        delay_ms = %delay.as_millis(),
                        "Waiting before grading"
                    );
                    tokio::time::sleep(*delay).await;
                    let feedback = self.grade(grader, utterance).await;
                    reply.clone_from(&feedback);
                    self.feedback = Some(feedback);
                }
                Effect::Hangup => {}
            }
        }

        // Nothing is recorded until the turn completes, so a dropped
        // quiet period leaves the session as it was
        if let Some(text) = utterance {
            self.transcript.push(text.to_string());
        }
        self.last_response_at = Utc::now();

        let terminal = result.is_terminal();
        tracing::info!(
            call_sid = %self.context.call_sid,
            from = %self.phase,
            to = %result.new_phase,
            terminal,
            "Call phase advanced"
        );
        self.phase = result.new_phase;
        self.done = self.phase.is_terminal();

        Ok(Turn {
            reply,
            phase: self.phase,
            terminal,
        })
    }

    /// Grade the transcript plus the utterance still being handled,
    /// falling back to the static line on failure
    async fn grade<G>(&self, grader: &G, pending: Option<&str>) -> String
    where
        G: Grader + ?Sized,
    {
        let transcript: Vec<String> = self
            .transcript
            .iter()
            .cloned()
            .chain(pending.map(ToString::to_string))
            .collect();
        match grader.grade(&transcript).await {
            Ok(feedback) => feedback,
            Err(e) => {
                tracing::warn!(
                    call_sid = %self.context.call_sid,
                    error = %e,
                    "Grading failed, using static feedback"
                );
                self.context.script.static_feedback.clone()
            }
        }
    }

    pub fn call_sid(&self) -> &str {
        &self.context.call_sid
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn grading_delay(&self) -> std::time::Duration {
        self.context.grading_delay
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            call_sid: self.context.call_sid.clone(),
            phase: self.phase,
            transcript: self.transcript.clone(),
            feedback: self.feedback.clone(),
            created_at: self.created_at,
            last_response_at: self.last_response_at,
            done: self.done,
        }
    }
}
