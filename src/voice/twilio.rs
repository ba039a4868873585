//! Caller recordings from Twilio's media endpoint

use super::{AudioClip, VoiceError};
use crate::runtime::RecordingSource;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Twilio can call the action URL before the media is published
const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct TwilioRecordings {
    client: Client,
    account_sid: String,
    auth_token: String,
    attempts: u32,
    retry_delay: Duration,
}

impl TwilioRecordings {
    pub fn new(account_sid: &str, auth_token: &str) -> Result<Self, VoiceError> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            attempts: DEFAULT_FETCH_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }
}

/// `RecordingUrl` has no extension; asking for `.mp3` gets a small payload
pub fn media_url(recording_url: &str) -> String {
    let trimmed = recording_url.trim();
    let last_segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if last_segment.contains('.') {
        trimmed.to_string()
    } else {
        format!("{trimmed}.mp3")
    }
}

#[async_trait]
impl RecordingSource for TwilioRecordings {
    async fn fetch(&self, recording_url: &str) -> Result<AudioClip, VoiceError> {
        let url = media_url(recording_url);

        for attempt in 1..=self.attempts {
            let response = self
                .client
                .get(&url)
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("audio/mpeg")
                        .to_string();
                    let bytes = response.bytes().await?;
                    tracing::debug!(attempt, bytes = bytes.len(), "Fetched caller recording");
                    return Ok(AudioClip {
                        bytes: bytes.to_vec(),
                        content_type,
                    });
                }
                StatusCode::NOT_FOUND if attempt < self.attempts => {
                    tracing::debug!(attempt, url = %url, "Recording not published yet, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                status => {
                    return Err(VoiceError::Recording(format!("HTTP {status} fetching {url}")));
                }
            }
        }

        Err(VoiceError::Recording(format!(
            "{url} not available after {} attempts",
            self.attempts
        )))
    }
}
