use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Recording unavailable: {0}")]
    Recording(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
