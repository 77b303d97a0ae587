pub mod groq;

use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error as StdError;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use self::groq::{ GroqSynthesizer, GroqTranscriber };

/// Hard client-side cap on one uploaded clip. Payloads at or above this are
/// rejected before any network call.
pub const MAX_AUDIO_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AudioFormat {
    #[default]
    Webm,
    Ogg,
    Wav,
    Mp3,
}

impl AudioFormat {
    /// Upload filename the transcription provider expects for this format.
    pub fn file_name(&self) -> &'static str {
        match self {
            AudioFormat::Webm => "audio.webm",
            AudioFormat::Ogg => "audio.ogg",
            AudioFormat::Wav => "audio.wav",
            AudioFormat::Mp3 => "audio.mp3",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Webm => "audio/webm",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
        }
    }

    /// Best-effort mapping from a reported MIME type; unknown types fall back
    /// to webm, the format browsers record in by default.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_lowercase();
        if mime.contains("ogg") {
            AudioFormat::Ogg
        } else if mime.contains("wav") || mime.contains("wave") {
            AudioFormat::Wav
        } else if mime.contains("mp3") || mime.contains("mpeg") {
            AudioFormat::Mp3
        } else {
            AudioFormat::Webm
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioPayload {
    pub data: Vec<u8>,
    pub format: AudioFormat,
}

impl AudioPayload {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    pub fn validate(&self) -> Result<(), SpeechError> {
        if self.data.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        if self.data.len() >= MAX_AUDIO_BYTES {
            return Err(SpeechError::AudioTooLarge);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Audio file is empty")]
    EmptyAudio,
    #[error("Audio file too large. Maximum size is 2MB.")]
    AudioTooLarge,
    #[error("No text provided")]
    EmptyText,
    #[error("Speech-to-text API error: {0}")]
    Transcription(String),
    #[error("Text-to-speech API error: {0}")]
    Synthesis(String),
    #[error(transparent)] Http(#[from] reqwest::Error),
}

#[derive(Deserialize, Debug, Clone)]
pub struct Transcription {
    pub text: String,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Upload one clip and return best-effort transcribed text. The payload
    /// must already have passed `validate`; implementations re-check before
    /// any network call.
    async fn transcribe(&self, audio: &AudioPayload) -> Result<Transcription, SpeechError>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with the given voice and return raw audio bytes.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError>;

    fn default_voice(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechProvider {
    Groq,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseSpeechProviderError {
    message: String,
}

impl std::fmt::Display for ParseSpeechProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for ParseSpeechProviderError {}

impl FromStr for SpeechProvider {
    type Err = ParseSpeechProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(SpeechProvider::Groq),
            _ =>
                Err(ParseSpeechProviderError {
                    message: format!("Invalid speech provider: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub provider: SpeechProvider,
    pub api_key: Option<String>,
    pub stt_model: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub base_url: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::Groq,
            api_key: None,
            stt_model: None,
            tts_model: None,
            tts_voice: None,
            base_url: None,
        }
    }
}

pub fn new_transcriber(
    config: &SpeechConfig
) -> Result<Arc<dyn Transcriber>, Box<dyn StdError + Send + Sync>> {
    let transcriber: Arc<dyn Transcriber> = match config.provider {
        SpeechProvider::Groq => {
            let specific = GroqTranscriber::from_config(config)?;
            Arc::new(specific)
        }
    };
    Ok(transcriber)
}

pub fn new_synthesizer(
    config: &SpeechConfig
) -> Result<Arc<dyn Synthesizer>, Box<dyn StdError + Send + Sync>> {
    let synthesizer: Arc<dyn Synthesizer> = match config.provider {
        SpeechProvider::Groq => {
            let specific = GroqSynthesizer::from_config(config)?;
            Arc::new(specific)
        }
    };
    Ok(synthesizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_mapping_follows_reported_mime() {
        assert_eq!(AudioFormat::from_mime("audio/ogg; codecs=opus"), AudioFormat::Ogg);
        assert_eq!(AudioFormat::from_mime("audio/x-wave"), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_mime("audio/mpeg"), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_mime("application/octet-stream"), AudioFormat::Webm);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let payload = AudioPayload::new(Vec::new(), AudioFormat::Webm);
        assert!(matches!(payload.validate(), Err(SpeechError::EmptyAudio)));
    }

    #[test]
    fn payload_at_limit_is_rejected() {
        let payload = AudioPayload::new(vec![0u8; MAX_AUDIO_BYTES], AudioFormat::Webm);
        assert!(matches!(payload.validate(), Err(SpeechError::AudioTooLarge)));
    }

    #[test]
    fn payload_below_limit_passes() {
        let payload = AudioPayload::new(vec![0u8; MAX_AUDIO_BYTES - 1], AudioFormat::Ogg);
        assert!(payload.validate().is_ok());
    }
}
