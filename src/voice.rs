//! Speech collaborators: text-to-speech, speech-to-text and caller recordings
//!
//! Thin HTTP wrappers around `ElevenLabs`, the `OpenAI` transcription API and
//! Twilio's recording media endpoint, plus the cache that serves
//! synthesized clips back to Twilio.

mod audio_cache;
mod elevenlabs;
mod error;
mod twilio;
mod whisper;

pub use audio_cache::{AudioCache, DEFAULT_AUDIO_CACHE_CAPACITY};
pub use elevenlabs::ElevenLabsSynthesizer;
pub use error::VoiceError;
pub use twilio::TwilioRecordings;
pub use whisper::WhisperTranscriber;

/// A chunk of encoded audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl AudioClip {
    pub fn mp3(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "audio/mpeg".to_string(),
        }
    }

    /// File name for multipart uploads; transcription APIs sniff the extension
    pub fn file_name(&self) -> &'static str {
        match self.content_type.as_str() {
            "audio/mpeg" | "audio/mp3" => "recording.mp3",
            "audio/wav" | "audio/x-wav" => "recording.wav",
            "audio/ogg" => "recording.ogg",
            _ => "recording.bin",
        }
    }
}

/// Credentials and endpoints for the speech vendors
#[derive(Debug, Clone, Default)]
pub struct VoiceConfig {
    pub eleven_labs_api_key: Option<String>,
    pub eleven_labs_voice_id: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub stt_api_key: Option<String>,
    pub stt_base_url: Option<String>,
    pub stt_model: Option<String>,
}

impl VoiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            eleven_labs_api_key: get("ELEVEN_LABS_API_KEY"),
            eleven_labs_voice_id: get("ELEVEN_LABS_VOICE_ID"),
            twilio_account_sid: get("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: get("TWILIO_AUTH_TOKEN"),
            stt_api_key: get("STT_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            stt_base_url: get("STT_API_URL"),
            stt_model: get("STT_MODEL"),
        }
    }

    /// `ElevenLabs` synthesizer, or `None` to let Twilio speak replies itself
    pub fn synthesizer(&self) -> Result<Option<ElevenLabsSynthesizer>, VoiceError> {
        match (&self.eleven_labs_api_key, &self.eleven_labs_voice_id) {
            (Some(key), Some(voice)) => Ok(Some(ElevenLabsSynthesizer::new(key, voice)?)),
            (None, None) => Ok(None),
            _ => Err(VoiceError::Config(
                "ELEVEN_LABS_API_KEY and ELEVEN_LABS_VOICE_ID must be set together".to_string(),
            )),
        }
    }

    pub fn transcriber(&self) -> Result<WhisperTranscriber, VoiceError> {
        let api_key = self.stt_api_key.as_deref().ok_or_else(|| {
            VoiceError::Config("transcription requires STT_API_KEY or OPENAI_API_KEY".to_string())
        })?;
        WhisperTranscriber::new(
            self.stt_base_url.as_deref(),
            api_key,
            self.stt_model.as_deref(),
        )
    }

    pub fn recordings(&self) -> Result<TwilioRecordings, VoiceError> {
        match (&self.twilio_account_sid, &self.twilio_auth_token) {
            (Some(sid), Some(token)) => TwilioRecordings::new(sid, token),
            _ => Err(VoiceError::Config(
                "TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN are required to fetch recordings"
                    .to_string(),
            )),
        }
    }
}
