//! Call runtime executor

use super::{CallCommand, CallError, Collaborators, NextStep, Speech, TurnOutcome, REPROMPT};
use crate::db::CallOutcome;
use crate::state_machine::{CallPhase, CallSession, InvalidStateError, Turn};
use crate::voice::VoiceError;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns one call's session and runs its turns in order
pub struct CallRuntime {
    session: CallSession,
    collaborators: Collaborators,
    idle_timeout: Duration,
    commands: mpsc::Receiver<CallCommand>,
    cancel: CancellationToken,
    /// Runtime this one replaced; it must finish writing before this one starts
    previous: Option<JoinHandle<()>>,
    /// Feedback produced after the quiet period, until the provider asks for it
    pending_feedback: Option<TurnOutcome>,
}

impl CallRuntime {
    pub fn new(
        session: CallSession,
        collaborators: Collaborators,
        idle_timeout: Duration,
        commands: mpsc::Receiver<CallCommand>,
        cancel: CancellationToken,
        previous: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            session,
            collaborators,
            idle_timeout,
            commands,
            cancel,
            previous,
            pending_feedback: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(call_sid = %self.session.call_sid(), "Starting call runtime");
        let cancel = self.cancel.clone();

        // The replaced runtime was cancelled; wait for its outcome write so it
        // cannot land on this call's row
        if let Some(previous) = self.previous.take() {
            let _ = previous.await;
        }

        let outcome = loop {
            let command = tokio::select! {
                biased;
                () = cancel.cancelled() => break CallOutcome::HungUp,
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break CallOutcome::Abandoned,
                },
                () = tokio::time::sleep(self.idle_timeout) => {
                    tracing::warn!(
                        call_sid = %self.session.call_sid(),
                        phase = %self.session.phase(),
                        "Call idle, abandoning"
                    );
                    break CallOutcome::Abandoned;
                }
            };

            let flow = tokio::select! {
                biased;
                () = cancel.cancelled() => break CallOutcome::HungUp,
                flow = self.handle_command(command) => flow,
            };
            if flow.is_break() {
                break CallOutcome::Completed;
            }

            // The reply for the last turn is already on its way; the quiet
            // period runs while the provider plays its matching pause.
            if self.session.phase() == CallPhase::Waiting {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break CallOutcome::HungUp,
                    () = self.prepare_feedback() => {}
                }
            }
        };

        self.finish(outcome).await;
    }

    async fn handle_command(&mut self, command: CallCommand) -> ControlFlow<()> {
        match command {
            CallCommand::Greet { from, to, reply } => {
                let result = self.greet(&from, &to).await;
                let _ = reply.send(result);
                ControlFlow::Continue(())
            }
            CallCommand::CallerTurn {
                recording_url,
                reply,
            } => {
                let result = self.caller_turn(recording_url.as_deref()).await;
                let ended = matches!(&result, Ok(outcome) if outcome.next == NextStep::Hangup);
                let _ = reply.send(result);
                if ended {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
            CallCommand::Feedback { reply } => match self.pending_feedback.take() {
                Some(outcome) => {
                    let _ = reply.send(Ok(outcome));
                    ControlFlow::Break(())
                }
                None => {
                    let _ = reply.send(Err(CallError::NoFeedback));
                    ControlFlow::Continue(())
                }
            },
        }
    }

    /// The implicit first turn: record the call and play the greeting
    async fn greet(&mut self, from: &str, to: &str) -> Result<TurnOutcome, CallError> {
        let call_sid = self.session.call_sid();
        if let Err(e) = self.collaborators.store.create_call(call_sid, from, to).await {
            tracing::warn!(call_sid = %call_sid, error = %e, "Failed to record new call");
        }
        tracing::debug!(
            call_sid = %self.session.call_sid(),
            greeting = %self.session.initial_message(),
            "Greeting caller"
        );
        let turn = self
            .session
            .advance(None, self.collaborators.grader.as_ref())
            .await?;
        self.persist().await;
        Ok(self.respond(&turn).await)
    }

    /// Fetch, transcribe, advance, synthesize
    async fn caller_turn(&mut self, recording_url: Option<&str>) -> Result<TurnOutcome, CallError> {
        if self.session.is_done() {
            return Err(CallError::SessionEnded(InvalidStateError));
        }

        let started = Instant::now();
        let utterance = match self.listen(recording_url).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    call_sid = %self.session.call_sid(),
                    error = %e,
                    "Could not understand caller, asking again"
                );
                return Ok(TurnOutcome {
                    speech: self.speak(REPROMPT).await,
                    phase: self.session.phase(),
                    next: NextStep::Record,
                });
            }
        };

        let turn = self
            .session
            .advance(Some(&utterance), self.collaborators.grader.as_ref())
            .await?;
        self.persist().await;
        let outcome = self.respond(&turn).await;

        tracing::info!(
            call_sid = %self.session.call_sid(),
            phase = %outcome.phase,
            duration_ms = %started.elapsed().as_millis(),
            "Caller turn handled"
        );
        Ok(outcome)
    }

    /// Quiet period, grading and synthesis for the final turn
    async fn prepare_feedback(&mut self) {
        match self
            .session
            .advance(None, self.collaborators.grader.as_ref())
            .await
        {
            Ok(turn) => {
                self.persist().await;
                self.pending_feedback = Some(self.respond(&turn).await);
            }
            Err(e) => {
                tracing::error!(call_sid = %self.session.call_sid(), error = %e, "Feedback turn failed");
            }
        }
    }

    async fn listen(&self, recording_url: Option<&str>) -> Result<String, VoiceError> {
        let Some(url) = recording_url.filter(|url| !url.trim().is_empty()) else {
            return Ok(String::new());
        };
        let clip = self.collaborators.recordings.fetch(url).await?;
        self.collaborators.transcriber.transcribe(&clip).await
    }

    async fn respond(&self, turn: &Turn) -> TurnOutcome {
        let next = if turn.terminal {
            NextStep::Hangup
        } else if turn.phase == CallPhase::Waiting {
            NextStep::AwaitFeedback {
                delay: self.session.grading_delay(),
            }
        } else {
            NextStep::Record
        };

        TurnOutcome {
            speech: self.speak(&turn.reply).await,
            phase: turn.phase,
            next,
        }
    }

    async fn speak(&self, text: &str) -> Speech {
        let Some(synthesizer) = &self.collaborators.synthesizer else {
            return Speech::Say {
                text: text.to_string(),
            };
        };

        match synthesizer.synthesize(text).await {
            Ok(clip) => Speech::Audio {
                id: self.collaborators.audio.insert(clip).await,
            },
            Err(e) => {
                tracing::warn!(
                    call_sid = %self.session.call_sid(),
                    error = %e,
                    "Synthesis failed, falling back to provider voice"
                );
                Speech::Say {
                    text: text.to_string(),
                }
            }
        }
    }

    async fn persist(&self) {
        let snapshot = self.session.snapshot();
        if let Err(e) = self.collaborators.store.save_snapshot(&snapshot).await {
            tracing::warn!(call_sid = %snapshot.call_sid, error = %e, "Failed to save call snapshot");
        }
    }

    async fn finish(self, outcome: CallOutcome) {
        let call_sid = self.session.call_sid();
        // A graded session counts as completed however the line dropped
        let outcome = if self.session.is_done() {
            CallOutcome::Completed
        } else {
            outcome
        };

        if let Err(e) = self.collaborators.store.set_outcome(call_sid, outcome).await {
            tracing::warn!(call_sid = %call_sid, error = %e, "Failed to record call outcome");
        }
        tracing::info!(
            call_sid = %call_sid,
            phase = %self.session.phase(),
            outcome = %outcome,
            turns = self.session.transcript().len(),
            "Call runtime stopped"
        );
    }
}
