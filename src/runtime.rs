//! Call controller
//!
//! One tokio task per live call owns that call's `CallSession`. Webhook
//! handlers talk to it through `CallManager`, which serializes every turn
//! of a call through the task's command channel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::CallRuntime;
pub use traits::*;

use crate::grading::{Grader, GradingMode};
use crate::state_machine::{CallPhase, CallSession, InvalidStateError, Script, SessionContext};
use crate::voice::AudioCache;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_RECORD_MAX_LENGTH: u32 = 15;
pub const DEFAULT_RECORD_TIMEOUT: u32 = 5;

/// Spoken when the caller's audio could not be fetched or transcribed
pub const REPROMPT: &str = "Sorry, I didn't catch that. Could you say that again?";

#[derive(Debug, Error)]
pub enum CallError {
    #[error("no active call: {0}")]
    NotFound(String),
    #[error(transparent)]
    SessionEnded(#[from] InvalidStateError),
    #[error("no feedback is pending for this call")]
    NoFeedback,
    #[error("call runtime stopped")]
    RuntimeGone,
}

/// Per-deployment call settings
#[derive(Debug, Clone)]
pub struct CallSettings {
    /// `None` picks rubric grading when an LLM is configured
    pub grading_mode: Option<GradingMode>,
    pub grading_delay: Duration,
    pub idle_timeout: Duration,
    pub record_max_length: u32,
    pub record_timeout: u32,
    pub script: Arc<Script>,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            grading_mode: None,
            grading_delay: crate::state_machine::state::DEFAULT_GRADING_DELAY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            record_max_length: DEFAULT_RECORD_MAX_LENGTH,
            record_timeout: DEFAULT_RECORD_TIMEOUT,
            script: Arc::new(Script::default()),
        }
    }
}

impl CallSettings {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            grading_mode: parse_var(&lookup, "GRADING_MODE")?,
            grading_delay: parse_var(&lookup, "GRADING_DELAY_SECS")?
                .map_or(defaults.grading_delay, Duration::from_secs),
            idle_timeout: parse_var(&lookup, "CALL_IDLE_TIMEOUT_SECS")?
                .map_or(defaults.idle_timeout, Duration::from_secs),
            record_max_length: parse_var(&lookup, "RECORD_MAX_LENGTH")?
                .unwrap_or(defaults.record_max_length),
            record_timeout: parse_var(&lookup, "RECORD_TIMEOUT")?
                .unwrap_or(defaults.record_timeout),
            script: defaults.script,
        })
    }

    /// Grading mode to run with, given whether an LLM is available
    pub fn effective_grading_mode(&self, llm_available: bool) -> GradingMode {
        match self.grading_mode {
            Some(GradingMode::Rubric) if !llm_available => {
                tracing::warn!("Rubric grading requested but no LLM is configured, using static feedback");
                GradingMode::Static
            }
            Some(mode) => mode,
            None if llm_available => GradingMode::Rubric,
            None => GradingMode::Static,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("invalid {key}={raw:?}: {e}")),
        _ => Ok(None),
    }
}

/// Everything a call runtime talks to
#[derive(Clone)]
pub struct Collaborators {
    pub recordings: Arc<dyn RecordingSource>,
    pub transcriber: Arc<dyn Transcriber>,
    /// `None` lets the telephony provider speak replies itself
    pub synthesizer: Option<Arc<dyn Synthesizer>>,
    pub grader: Arc<dyn Grader>,
    pub store: Arc<dyn CallStore>,
    pub audio: Arc<AudioCache>,
}

/// How a reply reaches the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speech {
    /// Synthesized clip in the audio cache
    Audio { id: String },
    /// Text for the provider's built-in voice
    Say { text: String },
}

/// What the provider should do once the reply has played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Record,
    /// Pause for the quiet period, then collect feedback
    AwaitFeedback { delay: Duration },
    Hangup,
}

/// Result of one command to a call runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub speech: Speech,
    pub phase: CallPhase,
    pub next: NextStep,
}

pub type Reply = oneshot::Sender<Result<TurnOutcome, CallError>>;

/// Commands processed by a call runtime, one at a time
#[derive(Debug)]
pub enum CallCommand {
    /// Record the new call and play the greeting
    Greet {
        from: String,
        to: String,
        reply: Reply,
    },
    CallerTurn { recording_url: Option<String>, reply: Reply },
    Feedback { reply: Reply },
}

/// Handle to interact with a running call
struct CallHandle {
    commands: mpsc::Sender<CallCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Manager for all live calls
pub struct CallManager {
    settings: CallSettings,
    collaborators: Collaborators,
    calls: RwLock<HashMap<String, CallHandle>>,
}

impl CallManager {
    pub fn new(settings: CallSettings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
            calls: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    /// Start a fresh session for `call_sid` and return the greeting.
    ///
    /// A session already running under the same SID is cancelled and
    /// replaced. The swap happens under one write lock, so concurrent starts
    /// for a SID always leave exactly one live session.
    pub async fn start_call(
        &self,
        call_sid: &str,
        from: &str,
        to: &str,
    ) -> Result<TurnOutcome, CallError> {
        let context = SessionContext::new(
            call_sid,
            self.settings.script.clone(),
            self.settings.grading_delay,
        );
        let (command_tx, command_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        {
            let mut calls = self.calls.write().await;
            let previous = calls.remove(call_sid).map(|old| {
                tracing::info!(call_sid = %call_sid, "Replacing existing session");
                old.cancel.cancel();
                old.task
            });
            let runtime = CallRuntime::new(
                CallSession::new(context),
                self.collaborators.clone(),
                self.settings.idle_timeout,
                command_rx,
                cancel.clone(),
                previous,
            );
            let task = tokio::spawn(runtime.run());
            calls.insert(
                call_sid.to_string(),
                CallHandle {
                    commands: command_tx.clone(),
                    cancel,
                    task,
                },
            );
        }

        tracing::info!(call_sid = %call_sid, from = %from, "Call started");
        let (from, to) = (from.to_string(), to.to_string());
        Self::send(&command_tx, |reply| CallCommand::Greet { from, to, reply }).await
    }

    /// Run one caller turn. A missing recording counts as silence.
    pub async fn caller_turn(
        &self,
        call_sid: &str,
        recording_url: Option<&str>,
    ) -> Result<TurnOutcome, CallError> {
        let recording_url = recording_url.map(ToString::to_string);
        self.request(call_sid, |reply| CallCommand::CallerTurn {
            recording_url,
            reply,
        })
        .await
    }

    /// Collect the feedback produced after the quiet period
    pub async fn feedback(&self, call_sid: &str) -> Result<TurnOutcome, CallError> {
        self.request(call_sid, |reply| CallCommand::Feedback { reply })
            .await
    }

    /// The caller went away. Returns false if no session was running.
    pub async fn hangup(&self, call_sid: &str, reason: &str) -> bool {
        let handle = self.calls.write().await.remove(call_sid);
        match handle {
            Some(handle) => {
                tracing::info!(call_sid = %call_sid, reason = %reason, "Ending call");
                handle.cancel.cancel();
                true
            }
            None => {
                tracing::debug!(call_sid = %call_sid, reason = %reason, "Hangup for inactive call");
                false
            }
        }
    }

    /// Number of calls with a running session
    pub async fn active_calls(&self) -> usize {
        self.calls
            .read()
            .await
            .values()
            .filter(|h| !h.commands.is_closed())
            .count()
    }

    async fn request(
        &self,
        call_sid: &str,
        command: impl FnOnce(Reply) -> CallCommand,
    ) -> Result<TurnOutcome, CallError> {
        let commands = self.sender(call_sid).await?;
        Self::send(&commands, command).await
    }

    async fn send(
        commands: &mpsc::Sender<CallCommand>,
        command: impl FnOnce(Reply) -> CallCommand,
    ) -> Result<TurnOutcome, CallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(command(reply_tx))
            .await
            .map_err(|_| CallError::RuntimeGone)?;
        reply_rx.await.map_err(|_| CallError::RuntimeGone)?
    }

    /// Command channel for a live call, pruning handles whose task has exited
    async fn sender(&self, call_sid: &str) -> Result<mpsc::Sender<CallCommand>, CallError> {
        {
            let calls = self.calls.read().await;
            match calls.get(call_sid) {
                Some(handle) if !handle.commands.is_closed() => {
                    return Ok(handle.commands.clone());
                }
                Some(_) => {}
                None => return Err(CallError::NotFound(call_sid.to_string())),
            }
        }

        let mut calls = self.calls.write().await;
        if calls
            .get(call_sid)
            .is_some_and(|handle| handle.commands.is_closed())
        {
            calls.remove(call_sid);
            tracing::debug!(call_sid = %call_sid, "Pruned finished call");
        }
        Err(CallError::NotFound(call_sid.to_string()))
    }
}
