use async_trait::async_trait;
use log::{ info, warn };
use reqwest::Client as HttpClient;
use reqwest::multipart::{ Form, Part };
use std::error::Error as StdError;

use super::{ AudioPayload, SpeechConfig, SpeechError, Synthesizer, Transcriber, Transcription };

pub const GROQ_TRANSCRIPTION_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
pub const GROQ_SPEECH_URL: &str = "https://api.groq.com/openai/v1/audio/speech";

pub struct GroqTranscriber {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

impl GroqTranscriber {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let stt_model = model.unwrap_or_else(|| "whisper-large-v3-turbo".to_string());
        let api_url = base_url.unwrap_or_else(|| GROQ_TRANSCRIPTION_URL.to_string());

        let http = HttpClient::builder()
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            api_key,
            model: stt_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &SpeechConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Groq API key is required".to_string())?;

        Self::new(api_key, config.stt_model.clone(), config.base_url.clone())
    }

    pub fn get_model(&self) -> String {
        self.model.clone()
    }
}

#[async_trait]
impl Transcriber for GroqTranscriber {
    async fn transcribe(&self, audio: &AudioPayload) -> Result<Transcription, SpeechError> {
        audio.validate()?;

        info!(
            "Sending {} bytes of {} audio for transcription",
            audio.data.len(),
            audio.format.mime_type()
        );

        let file_part = Part::bytes(audio.data.clone())
            .file_name(audio.format.file_name())
            .mime_str(audio.format.mime_type())
            .map_err(SpeechError::Http)?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json")
            .text("language", "en");

        let resp = self.http
            .post(self.base_url.trim_end_matches('/'))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send().await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Transcription provider error: {}", body);
            return Err(SpeechError::Transcription(body));
        }

        let transcription = resp.json::<Transcription>().await?;
        Ok(transcription)
    }
}

pub struct GroqSynthesizer {
    http: HttpClient,
    api_key: String,
    model: String,
    voice: String,
    base_url: String,
}

impl GroqSynthesizer {
    pub fn new(
        api_key: String,
        model: Option<String>,
        voice: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let tts_model = model.unwrap_or_else(|| "playai-tts".to_string());
        let tts_voice = voice.unwrap_or_else(|| "Fritz-PlayAI".to_string());
        let api_url = base_url.unwrap_or_else(|| GROQ_SPEECH_URL.to_string());

        let http = HttpClient::builder()
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            api_key,
            model: tts_model,
            voice: tts_voice,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &SpeechConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Groq API key is required".to_string())?;

        Self::new(
            api_key,
            config.tts_model.clone(),
            config.tts_voice.clone(),
            config.base_url.clone()
        )
    }
}

#[async_trait]
impl Synthesizer for GroqSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let voice = if voice.is_empty() { self.voice.as_str() } else { voice };

        let body =
            serde_json::json!({
            "model": self.model,
            "voice": voice,
            "input": text,
            "response_format": "wav",
        });

        let resp = self.http
            .post(self.base_url.trim_end_matches('/'))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send().await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Synthesis provider error: {}", body);
            return Err(SpeechError::Synthesis(body));
        }

        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn default_voice(&self) -> String {
        self.voice.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{ AudioFormat, MAX_AUDIO_BYTES };

    #[test]
    fn transcriber_defaults() {
        let transcriber = GroqTranscriber::new("key".to_string(), None, None).unwrap();
        assert_eq!(transcriber.get_model(), "whisper-large-v3-turbo");
        assert_eq!(transcriber.base_url, GROQ_TRANSCRIPTION_URL);
    }

    #[test]
    fn synthesizer_defaults() {
        let synthesizer = GroqSynthesizer::new("key".to_string(), None, None, None).unwrap();
        assert_eq!(synthesizer.default_voice(), "Fritz-PlayAI");
        assert_eq!(synthesizer.model, "playai-tts");
        assert_eq!(synthesizer.base_url, GROQ_SPEECH_URL);
    }

    #[tokio::test]
    async fn oversized_payload_never_reaches_the_network() {
        // base_url is unroutable; an attempted request would error differently.
        let transcriber = GroqTranscriber::new(
            "key".to_string(),
            None,
            Some("http://127.0.0.1:1".to_string())
        ).unwrap();

        let payload = AudioPayload::new(vec![0u8; MAX_AUDIO_BYTES], AudioFormat::Webm);
        let result = transcriber.transcribe(&payload).await;
        assert!(matches!(result, Err(SpeechError::AudioTooLarge)));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_synthesis() {
        let synthesizer = GroqSynthesizer::new(
            "key".to_string(),
            None,
            None,
            Some("http://127.0.0.1:1".to_string())
        ).unwrap();

        let result = synthesizer.synthesize("   ", "Fritz-PlayAI").await;
        assert!(matches!(result, Err(SpeechError::EmptyText)));
    }
}
