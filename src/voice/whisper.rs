//! Speech-to-text through the `OpenAI` transcription endpoint

use super::{AudioClip, VoiceError};
use crate::runtime::Transcriber;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_STT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_STT_MODEL: &str = "whisper-1";
const STT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WhisperTranscriber {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(
        base_url: Option<&str>,
        api_key: &str,
        model: Option<&str>,
    ) -> Result<Self, VoiceError> {
        let client = Client::builder().timeout(STT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or(DEFAULT_STT_BASE_URL).to_string(),
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_STT_MODEL).to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioClip) -> Result<String, VoiceError> {
        if audio.bytes.is_empty() {
            return Ok(String::new());
        }

        let part = Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name())
            .mime_str(&audio.content_type)
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {status}: {body}")));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(parsed.text.trim().to_string())
    }
}
