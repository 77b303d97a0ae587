use log::{ info, warn };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;

use crate::llm::chat::{ ChatClient, CompletionRequest };
use crate::models::chat::{ ChatTurn, Modality, Role };
use crate::speech::{ AudioFormat, Synthesizer, Transcriber };
use super::ChatSession;
use super::capture::{ AudioSource, CaptureError, CaptureSession };
use super::playback::{ AudioSink, PlaybackController };

/// Hard cap on one listening turn; recording is force-stopped afterwards.
pub const MAX_LISTEN_DURATION: Duration = Duration::from_secs(10);

pub const VOICE_CHAT_GREETING: &str =
    "Welcome to voice chat mode. I'm listening. What can I help you with regarding your decisions?";

pub const FALLBACK_MIC: &str =
    "I couldn't access your microphone. Please check your browser permissions.";
pub const FALLBACK_RECOGNITION: &str =
    "I encountered an issue with voice recognition. Let's try again.";
pub const FALLBACK_DIDNT_CATCH: &str =
    "I didn't catch what you said. Could you please speak again?";
pub const FALLBACK_PROCESSING: &str = "I had trouble processing your question. Let's try again.";

/// The hands-free conversation mode: speak a greeting, then alternate
/// listen -> transcribe -> complete -> speak until ended. Voice turns live in
/// a transient buffer that is merged into the main transcript (minus the
/// synthetic greeting) when the loop finishes. Every failed step speaks a
/// fallback line and re-enters listening; one dead request never ends the
/// loop.
pub struct VoiceChatLoop<S: AudioSink + 'static> {
    history: Vec<ChatTurn>,
    capture: CaptureSession,
    playback: PlaybackController<S>,
    source: Arc<dyn AudioSource>,
    chat_client: Arc<dyn ChatClient>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
    voice: String,
    system: String,
    format: AudioFormat,
    listen_cap: Duration,
    ended: Arc<AtomicBool>,
}

impl<S: AudioSink + 'static> VoiceChatLoop<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn AudioSource>,
        chat_client: Arc<dyn ChatClient>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<S>,
        system: impl Into<String>,
        voice: Option<String>
    ) -> Self {
        let voice = voice.unwrap_or_else(|| synthesizer.default_voice());
        Self {
            history: Vec::new(),
            capture: CaptureSession::new(),
            playback: PlaybackController::new(sink),
            source,
            chat_client,
            transcriber,
            synthesizer,
            voice,
            system: system.into(),
            format: AudioFormat::Webm,
            listen_cap: MAX_LISTEN_DURATION,
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Shared flag a UI control flips to end the loop after the current turn.
    pub fn end_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ended)
    }

    pub fn is_active(&self) -> bool {
        !self.ended.load(Ordering::SeqCst)
    }

    /// Begin the session: reset the voice history and speak the greeting.
    pub async fn start(&mut self) {
        self.ended.store(false, Ordering::SeqCst);
        self.history.clear();
        self.history.push(ChatTurn::new(Role::Assistant, VOICE_CHAT_GREETING));
        self.speak(VOICE_CHAT_GREETING).await;
    }

    /// Drive the loop until the end flag is raised.
    pub async fn run(&mut self) {
        self.start().await;
        while self.is_active() {
            self.run_turn().await;
        }
    }

    /// One listen -> transcribe -> complete -> speak cycle.
    pub async fn run_turn(&mut self) {
        let mut rx = match self.source.acquire(self.format).await {
            Ok(rx) => rx,
            Err(CaptureError::Acquisition(e)) => {
                warn!("Microphone acquisition failed: {}", e);
                self.say_fallback(FALLBACK_MIC).await;
                return;
            }
            Err(e) => {
                warn!("Audio source error: {}", e);
                self.say_fallback(FALLBACK_MIC).await;
                return;
            }
        };

        if self.capture.start(self.format).is_err() {
            self.capture.abort();
            return;
        }

        let capture = &mut self.capture;
        let listen = async {
            while let Some(chunk) = rx.recv().await {
                let _ = capture.push_chunk(&chunk);
            }
        };
        // The source closing ends the turn early; otherwise the cap forces
        // the stop.
        let _ = tokio::time::timeout(self.listen_cap, listen).await;
        drop(rx);

        let payload = match self.capture.stop() {
            Ok(payload) => payload,
            Err(CaptureError::NoAudio) => {
                // Nothing was said; listen again without narrating it.
                return;
            }
            Err(CaptureError::TooLarge) => {
                warn!("Discarding oversized voice clip");
                self.say_fallback(FALLBACK_RECOGNITION).await;
                return;
            }
            Err(e) => {
                warn!("Recorder error: {}", e);
                return;
            }
        };

        let transcribed = self.transcriber.transcribe(&payload).await;
        self.capture.finish();

        let text = match transcribed {
            Ok(transcription) => transcription.text.trim().to_string(),
            Err(e) => {
                warn!("Transcription failed: {}", e);
                self.say_fallback(FALLBACK_RECOGNITION).await;
                return;
            }
        };

        if text.is_empty() {
            self.say_fallback(FALLBACK_DIDNT_CATCH).await;
            return;
        }

        info!("Voice turn transcribed: {}", text);
        self.history.push(ChatTurn::new(Role::User, text));

        let request = CompletionRequest::new(
            self.system.clone(),
            self.history.clone(),
            Modality::Voice
        );

        match self.chat_client.complete(&request).await {
            Ok(response) => {
                self.history.push(ChatTurn::new(Role::Assistant, response.response.clone()));
                self.speak(&response.response).await;
            }
            Err(e) => {
                warn!("Completion failed in voice chat: {}", e);
                self.say_fallback(FALLBACK_PROCESSING).await;
            }
        }
    }

    /// End the loop and fold the voice conversation into the main
    /// transcript, excluding the synthetic greeting.
    pub fn finish(mut self, session: &mut ChatSession) {
        self.ended.store(true, Ordering::SeqCst);
        self.playback.stop();
        self.capture.abort();

        if self.history.len() > 1 {
            let turns: Vec<ChatTurn> = self.history.drain(..).skip(1).collect();
            session.merge_voice_history(turns);
        }
    }

    /// Speak a fixed error line, recording it in the voice history the same
    /// way a real reply would be.
    async fn say_fallback(&mut self, line: &str) {
        self.history.push(ChatTurn::new(Role::Assistant, line));
        self.speak(line).await;
    }

    /// Synthesize and play to the end of playback. Synthesis or playback
    /// failure counts as "playback ended" so the loop keeps moving.
    async fn speak(&mut self, text: &str) {
        match self.synthesizer.synthesize(text, &self.voice).await {
            Ok(audio) => {
                let _ = self.playback.play_to_end(audio).await;
            }
            Err(e) => {
                warn!("Speech synthesis failed: {}", e);
            }
        }
    }
}
