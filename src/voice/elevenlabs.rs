//! `ElevenLabs` text-to-speech

use super::{AudioClip, VoiceError};
use crate::runtime::Synthesizer;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const ELEVEN_LABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Replies are one or two sentences; synthesis should be quick
const TTS_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ElevenLabsSynthesizer {
    client: Client,
    api_key: String,
    voice_id: String,
    base_url: String,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: &str, voice_id: &str) -> Result<Self, VoiceError> {
        let client = Client::builder().timeout(TTS_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            voice_id: voice_id.to_string(),
            base_url: ELEVEN_LABS_BASE_URL.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        )
    }
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.5,
        }
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, VoiceError> {
        let request = TtsRequest {
            text,
            voice_settings: VoiceSettings::default(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("ElevenLabs returned {status}: {body}")));
        }

        let bytes = response.bytes().await?;
        tracing::debug!(bytes = bytes.len(), chars = text.len(), "Synthesized reply");
        Ok(AudioClip::mp3(bytes.to_vec()))
    }
}
