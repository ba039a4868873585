//! Trait abstractions for call I/O
//!
//! These traits enable testing the call runtime with mock implementations.

use crate::db::{CallOutcome, Database};
use crate::state_machine::SessionSnapshot;
use crate::voice::{AudioClip, VoiceError};
use async_trait::async_trait;
use std::sync::Arc;

/// Downloads what the caller said
#[async_trait]
pub trait RecordingSource: Send + Sync {
    async fn fetch(&self, recording_url: &str) -> Result<AudioClip, VoiceError>;
}

/// Speech to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioClip) -> Result<String, VoiceError>;
}

/// Text to speech
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, VoiceError>;
}

/// Durable record of each call
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn create_call(&self, call_sid: &str, from: &str, to: &str) -> Result<(), String>;

    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), String>;

    async fn set_outcome(&self, call_sid: &str, outcome: CallOutcome) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: RecordingSource + ?Sized> RecordingSource for Arc<T> {
    async fn fetch(&self, recording_url: &str) -> Result<AudioClip, VoiceError> {
        (**self).fetch(recording_url).await
    }
}

#[async_trait]
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    async fn transcribe(&self, audio: &AudioClip) -> Result<String, VoiceError> {
        (**self).transcribe(audio).await
    }
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, VoiceError> {
        (**self).synthesize(text).await
    }
}

#[async_trait]
impl<T: CallStore + ?Sized> CallStore for Arc<T> {
    async fn create_call(&self, call_sid: &str, from: &str, to: &str) -> Result<(), String> {
        (**self).create_call(call_sid, from, to).await
    }

    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), String> {
        (**self).save_snapshot(snapshot).await
    }

    async fn set_outcome(&self, call_sid: &str, outcome: CallOutcome) -> Result<(), String> {
        (**self).set_outcome(call_sid, outcome).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `CallStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CallStore for DatabaseStorage {
    async fn create_call(&self, call_sid: &str, from: &str, to: &str) -> Result<(), String> {
        self.db
            .create_call(call_sid, from, to)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), String> {
        self.db.save_snapshot(snapshot).map_err(|e| e.to_string())
    }

    async fn set_outcome(&self, call_sid: &str, outcome: CallOutcome) -> Result<(), String> {
        self.db
            .set_outcome(call_sid, outcome)
            .map_err(|e| e.to_string())
    }
}
