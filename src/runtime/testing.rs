//! Mock implementations for testing
//!
//! These mocks enable call runtime and API tests without real I/O.

use super::traits::{CallStore, RecordingSource, Synthesizer, Transcriber};
use super::Collaborators;
use crate::db::CallOutcome;
use crate::grading::{Grader, GradingError};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::state_machine::SessionSnapshot;
use crate::voice::{AudioCache, AudioClip, VoiceError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock LLM
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::unknown("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Grader
// ============================================================================

/// Grader that returns queued feedback and records every transcript it saw
#[derive(Default)]
pub struct MockGrader {
    feedback: Mutex<VecDeque<Result<String, GradingError>>>,
    transcripts: Mutex<Vec<Vec<String>>>,
}

impl MockGrader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_feedback(&self, feedback: &str) {
        self.feedback
            .lock()
            .unwrap()
            .push_back(Ok(feedback.to_string()));
    }

    pub fn queue_error(&self, error: GradingError) {
        self.feedback.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_transcripts(&self) -> Vec<Vec<String>> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Grader for MockGrader {
    async fn grade(&self, transcript: &[String]) -> Result<String, GradingError> {
        self.transcripts.lock().unwrap().push(transcript.to_vec());
        self.feedback
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Mock feedback".to_string()))
    }
}

// ============================================================================
// Mock Voice Collaborators
// ============================================================================

/// Serves the URL itself as the audio bytes
#[derive(Default)]
pub struct MockRecordingSource {
    errors: Mutex<VecDeque<VoiceError>>,
    fetched: Mutex<Vec<String>>,
}

impl MockRecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next fetch
    pub fn queue_error(&self, error: VoiceError) {
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordingSource for MockRecordingSource {
    async fn fetch(&self, recording_url: &str) -> Result<AudioClip, VoiceError> {
        self.fetched.lock().unwrap().push(recording_url.to_string());
        if let Some(error) = self.errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(AudioClip::mp3(recording_url.as_bytes().to_vec()))
    }
}

/// Returns queued transcripts; silence once the queue is empty
#[derive(Default)]
pub struct MockTranscriber {
    transcripts: Mutex<VecDeque<Result<String, VoiceError>>>,
    calls: Mutex<usize>,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_transcript(&self, text: &str) {
        self.transcripts
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    pub fn queue_error(&self, error: VoiceError) {
        self.transcripts.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &AudioClip) -> Result<String, VoiceError> {
        *self.calls.lock().unwrap() += 1;
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Encodes the text itself as the "audio"
#[derive(Default)]
pub struct MockSynthesizer {
    failing: bool,
    spoken: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A synthesizer whose every request fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            spoken: Mutex::new(Vec::new()),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, VoiceError> {
        self.spoken.lock().unwrap().push(text.to_string());
        if self.failing {
            return Err(VoiceError::Tts("mock synthesizer offline".to_string()));
        }
        Ok(AudioClip::mp3(text.as_bytes().to_vec()))
    }
}

// ============================================================================
// In-Memory Call Store
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct StoredCall {
    pub from: String,
    pub to: String,
    pub snapshot: Option<SessionSnapshot>,
    pub outcome: CallOutcome,
}

/// In-memory call store for testing
#[derive(Default)]
pub struct InMemoryStore {
    calls: Mutex<HashMap<String, StoredCall>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call(&self, call_sid: &str) -> Option<StoredCall> {
        self.calls.lock().unwrap().get(call_sid).cloned()
    }

    pub fn outcome(&self, call_sid: &str) -> Option<CallOutcome> {
        self.call(call_sid).map(|c| c.outcome)
    }

    pub fn snapshot(&self, call_sid: &str) -> Option<SessionSnapshot> {
        self.call(call_sid).and_then(|c| c.snapshot)
    }
}

#[async_trait]
impl CallStore for InMemoryStore {
    async fn create_call(&self, call_sid: &str, from: &str, to: &str) -> Result<(), String> {
        self.calls.lock().unwrap().insert(
            call_sid.to_string(),
            StoredCall {
                from: from.to_string(),
                to: to.to_string(),
                ..StoredCall::default()
            },
        );
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), String> {
        let mut calls = self.calls.lock().unwrap();
        let call = calls
            .get_mut(&snapshot.call_sid)
            .ok_or_else(|| format!("call not found: {}", snapshot.call_sid))?;
        call.snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn set_outcome(&self, call_sid: &str, outcome: CallOutcome) -> Result<(), String> {
        let mut calls = self.calls.lock().unwrap();
        let call = calls
            .get_mut(call_sid)
            .ok_or_else(|| format!("call not found: {call_sid}"))?;
        call.outcome = outcome;
        Ok(())
    }
}

// ============================================================================
// Test Collaborators
// ============================================================================

/// Mock collaborators with handles kept for assertions
pub struct MockCollaborators {
    pub recordings: Arc<MockRecordingSource>,
    pub transcriber: Arc<MockTranscriber>,
    pub synthesizer: Option<Arc<MockSynthesizer>>,
    pub grader: Arc<MockGrader>,
    pub store: Arc<InMemoryStore>,
    pub audio: Arc<AudioCache>,
}

impl MockCollaborators {
    /// Mocks without a synthesizer, so replies come back as text
    pub fn new() -> Self {
        Self {
            recordings: Arc::new(MockRecordingSource::new()),
            transcriber: Arc::new(MockTranscriber::new()),
            synthesizer: None,
            grader: Arc::new(MockGrader::new()),
            store: Arc::new(InMemoryStore::new()),
            audio: Arc::new(AudioCache::default()),
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: MockSynthesizer) -> Self {
        self.synthesizer = Some(Arc::new(synthesizer));
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            recordings: self.recordings.clone(),
            transcriber: self.transcriber.clone(),
            synthesizer: self
                .synthesizer
                .clone()
                .map(|s| s as Arc<dyn Synthesizer>),
            grader: self.grader.clone(),
            store: self.store.clone(),
            audio: self.audio.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        CallError, CallManager, CallSettings, NextStep, Speech, TurnOutcome, REPROMPT,
    };
    use crate::state_machine::{CallPhase, Script};
    use std::time::Duration;

    fn manager_with(mocks: &MockCollaborators, settings: CallSettings) -> Arc<CallManager> {
        Arc::new(CallManager::new(settings, mocks.collaborators()))
    }

    fn fast_settings() -> CallSettings {
        CallSettings {
            grading_delay: Duration::ZERO,
            ..CallSettings::default()
        }
    }

    fn said(outcome: &TurnOutcome) -> &str {
        match &outcome.speech {
            Speech::Say { text } => text,
            Speech::Audio { id } => panic!("expected text, got audio clip {id}"),
        }
    }

    async fn wait_for_outcome(store: &InMemoryStore, call_sid: &str, expected: CallOutcome) {
        for _ in 0..200 {
            if store.outcome(call_sid) == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "call {call_sid} never reached {expected}, last seen {:?}",
            store.outcome(call_sid)
        );
    }

    #[tokio::test]
    async fn test_full_call_through_manager() {
        let mocks = MockCollaborators::new();
        mocks.grader.queue_feedback("You offered an appointment. Nice work.");
        for text in ["yes", "ok", "I don't know", "Let's book an appointment", "bye"] {
            mocks.transcriber.queue_transcript(text);
        }
        let manager = manager_with(&mocks, fast_settings());
        let script = Script::default();

        let greeting = manager.start_call("CA1", "+15550001", "+15550002").await.unwrap();
        assert_eq!(said(&greeting), script.greeting);
        assert_eq!(greeting.phase, CallPhase::Ring);
        assert_eq!(greeting.next, NextStep::Record);

        let expected = [
            ("Ring ring.", CallPhase::Scenario),
            (script.scenario.as_str(), CallPhase::Roleplay),
            (script.clarify.as_str(), CallPhase::Roleplay),
            ("Thank you, goodbye.", CallPhase::ThankYou),
        ];
        for (i, (reply, phase)) in expected.iter().enumerate() {
            let url = format!("https://api.twilio.com/RE{i}");
            let outcome = manager.caller_turn("CA1", Some(&url)).await.unwrap();
            assert_eq!(said(&outcome), *reply);
            assert_eq!(outcome.phase, *phase);
            assert_eq!(outcome.next, NextStep::Record);
        }

        let waiting = manager
            .caller_turn("CA1", Some("https://api.twilio.com/RE9"))
            .await
            .unwrap();
        assert_eq!(said(&waiting), "...");
        assert_eq!(waiting.phase, CallPhase::Waiting);
        assert_eq!(
            waiting.next,
            NextStep::AwaitFeedback {
                delay: Duration::ZERO
            }
        );

        let feedback = manager.feedback("CA1").await.unwrap();
        assert_eq!(said(&feedback), "You offered an appointment. Nice work.");
        assert_eq!(feedback.phase, CallPhase::Done);
        assert_eq!(feedback.next, NextStep::Hangup);

        wait_for_outcome(&mocks.store, "CA1", CallOutcome::Completed).await;
        let snapshot = mocks.store.snapshot("CA1").unwrap();
        assert_eq!(
            snapshot.transcript,
            vec!["yes", "ok", "I don't know", "Let's book an appointment", "bye"]
        );
        assert_eq!(
            snapshot.feedback.as_deref(),
            Some("You offered an appointment. Nice work.")
        );
        assert_eq!(mocks.grader.recorded_transcripts(), vec![snapshot.transcript]);
        assert_eq!(mocks.recordings.fetched_urls().len(), 5);

        let after = manager.caller_turn("CA1", None).await;
        assert!(matches!(
            after,
            Err(CallError::NotFound(_) | CallError::RuntimeGone)
        ));
    }

    #[tokio::test]
    async fn test_missing_recording_is_silence() {
        let mocks = MockCollaborators::new();
        let manager = manager_with(&mocks, fast_settings());
        manager.start_call("CA1", "a", "b").await.unwrap();

        let outcome = manager.caller_turn("CA1", None).await.unwrap();
        assert_eq!(said(&outcome), "Ring ring.");
        let outcome = manager.caller_turn("CA1", Some("  ")).await.unwrap();
        assert_eq!(outcome.phase, CallPhase::Roleplay);

        assert!(mocks.recordings.fetched_urls().is_empty());
        assert_eq!(mocks.transcriber.call_count(), 0);
        assert_eq!(
            mocks.store.snapshot("CA1").unwrap().transcript,
            vec!["", ""]
        );
    }

    #[tokio::test]
    async fn test_transcription_failure_reprompts_without_advancing() {
        let mocks = MockCollaborators::new();
        mocks
            .transcriber
            .queue_error(VoiceError::Stt("garbled".to_string()));
        mocks.transcriber.queue_transcript("yes");
        let manager = manager_with(&mocks, fast_settings());
        manager.start_call("CA1", "a", "b").await.unwrap();

        let reprompt = manager.caller_turn("CA1", Some("RE1")).await.unwrap();
        assert_eq!(said(&reprompt), REPROMPT);
        assert_eq!(reprompt.phase, CallPhase::Ring);
        assert_eq!(reprompt.next, NextStep::Record);

        let outcome = manager.caller_turn("CA1", Some("RE2")).await.unwrap();
        assert_eq!(said(&outcome), "Ring ring.");
        assert_eq!(mocks.store.snapshot("CA1").unwrap().transcript, vec!["yes"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_reprompts() {
        let mocks = MockCollaborators::new();
        mocks
            .recordings
            .queue_error(VoiceError::Recording("HTTP 404".to_string()));
        let manager = manager_with(&mocks, fast_settings());
        manager.start_call("CA1", "a", "b").await.unwrap();

        let reprompt = manager.caller_turn("CA1", Some("RE1")).await.unwrap();
        assert_eq!(said(&reprompt), REPROMPT);
        assert_eq!(mocks.transcriber.call_count(), 0);
    }

    #[tokio::test]
    async fn test_synthesized_replies_land_in_audio_cache() {
        let mocks = MockCollaborators::new().with_synthesizer(MockSynthesizer::new());
        let manager = manager_with(&mocks, fast_settings());

        let greeting = manager.start_call("CA1", "a", "b").await.unwrap();
        let Speech::Audio { id } = greeting.speech else {
            panic!("expected synthesized audio");
        };
        let clip = mocks.audio.get(&id).await.unwrap();
        assert_eq!(clip.bytes, Script::default().greeting.as_bytes());
        assert_eq!(
            mocks.synthesizer.as_ref().unwrap().spoken(),
            vec![Script::default().greeting]
        );
    }

    #[tokio::test]
    async fn test_synthesis_failure_falls_back_to_text() {
        let mocks = MockCollaborators::new().with_synthesizer(MockSynthesizer::failing());
        let manager = manager_with(&mocks, fast_settings());

        let greeting = manager.start_call("CA1", "a", "b").await.unwrap();
        assert_eq!(said(&greeting), Script::default().greeting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hangup_during_quiet_period_cancels_grading() {
        let mocks = MockCollaborators::new();
        for text in ["yes", "ok", "appointment", "bye"] {
            mocks.transcriber.queue_transcript(text);
        }
        let settings = CallSettings {
            grading_delay: Duration::from_secs(30),
            ..CallSettings::default()
        };
        let manager = manager_with(&mocks, settings);
        manager.start_call("CA1", "a", "b").await.unwrap();
        for i in 0..4 {
            manager
                .caller_turn("CA1", Some(&format!("RE{i}")))
                .await
                .unwrap();
        }

        assert!(manager.hangup("CA1", "completed").await);
        wait_for_outcome(&mocks.store, "CA1", CallOutcome::HungUp).await;

        assert!(mocks.grader.recorded_transcripts().is_empty());
        let snapshot = mocks.store.snapshot("CA1").unwrap();
        assert_eq!(snapshot.phase, CallPhase::Waiting);
        assert!(snapshot.feedback.is_none());
        assert!(matches!(
            manager.feedback("CA1").await,
            Err(CallError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_call_is_abandoned_and_pruned() {
        let mocks = MockCollaborators::new();
        let settings = CallSettings {
            idle_timeout: Duration::from_secs(60),
            ..fast_settings()
        };
        let manager = manager_with(&mocks, settings);
        manager.start_call("CA1", "a", "b").await.unwrap();
        assert_eq!(manager.active_calls().await, 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        wait_for_outcome(&mocks.store, "CA1", CallOutcome::Abandoned).await;

        assert_eq!(manager.active_calls().await, 0);
        assert!(matches!(
            manager.caller_turn("CA1", None).await,
            Err(CallError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restarting_a_call_begins_from_greeting() {
        let mocks = MockCollaborators::new();
        let manager = manager_with(&mocks, fast_settings());
        manager.start_call("CA1", "a", "b").await.unwrap();
        let outcome = manager.caller_turn("CA1", None).await.unwrap();
        assert_eq!(outcome.phase, CallPhase::Scenario);

        let greeting = manager.start_call("CA1", "a", "b").await.unwrap();
        assert_eq!(greeting.phase, CallPhase::Ring);
        let outcome = manager.caller_turn("CA1", None).await.unwrap();
        assert_eq!(said(&outcome), "Ring ring.");

        assert_eq!(mocks.store.outcome("CA1"), Some(CallOutcome::InProgress));
        assert_eq!(mocks.store.snapshot("CA1").unwrap().transcript, vec![""]);
        assert_eq!(manager.active_calls().await, 1);
    }

    #[tokio::test]
    async fn test_simultaneous_restarts_leave_one_live_session() {
        let mocks = MockCollaborators::new();
        let manager = manager_with(&mocks, fast_settings());
        manager.start_call("CA1", "a", "b").await.unwrap();

        let (first, second) = tokio::join!(
            manager.start_call("CA1", "a", "b"),
            manager.start_call("CA1", "a", "b")
        );
        assert!(first.is_ok() || second.is_ok());
        tokio::task::yield_now().await;

        assert_eq!(manager.active_calls().await, 1);
        assert_eq!(mocks.store.outcome("CA1"), Some(CallOutcome::InProgress));

        let outcome = manager.caller_turn("CA1", None).await.unwrap();
        assert_eq!(outcome.phase, CallPhase::Scenario);
        assert_eq!(mocks.store.outcome("CA1"), Some(CallOutcome::InProgress));
    }

    #[tokio::test]
    async fn test_unknown_call() {
        let mocks = MockCollaborators::new();
        let manager = manager_with(&mocks, fast_settings());
        assert!(matches!(
            manager.caller_turn("nope", None).await,
            Err(CallError::NotFound(_))
        ));
        assert!(matches!(
            manager.feedback("nope").await,
            Err(CallError::NotFound(_))
        ));
        assert!(!manager.hangup("nope", "completed").await);
    }

    #[tokio::test]
    async fn test_feedback_before_goodbye_is_rejected() {
        let mocks = MockCollaborators::new();
        let manager = manager_with(&mocks, fast_settings());
        manager.start_call("CA1", "a", "b").await.unwrap();

        assert!(matches!(
            manager.feedback("CA1").await,
            Err(CallError::NoFeedback)
        ));
        let outcome = manager.caller_turn("CA1", None).await.unwrap();
        assert_eq!(outcome.phase, CallPhase::Scenario);
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_serialized() {
        let mocks = MockCollaborators::new();
        mocks.transcriber.queue_transcript("first");
        mocks.transcriber.queue_transcript("second");
        let manager = manager_with(&mocks, fast_settings());
        manager.start_call("CA1", "a", "b").await.unwrap();

        let (a, b) = tokio::join!(
            manager.caller_turn("CA1", Some("RE1")),
            manager.caller_turn("CA1", Some("RE2"))
        );
        let mut phases = vec![a.unwrap().phase, b.unwrap().phase];
        phases.sort();
        assert_eq!(phases, vec![CallPhase::Scenario, CallPhase::Roleplay]);

        let snapshot = mocks.store.snapshot("CA1").unwrap();
        assert_eq!(snapshot.transcript, vec!["first", "second"]);
        assert_eq!(snapshot.phase, CallPhase::Roleplay);
    }
}
