use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::speech::{ AudioFormat, AudioPayload, MAX_AUDIO_BYTES };

/// Recording sub-state of the session controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureState {
    #[default]
    Idle,
    Recording,
    Processing,
}

#[derive(Debug, Error, PartialEq)]
pub enum CaptureError {
    #[error("Recorder is not idle")]
    NotIdle,
    #[error("Recorder is not recording")]
    NotRecording,
    #[error("No audio data collected")]
    NoAudio,
    #[error("Audio file too large. Maximum size is 2MB.")]
    TooLarge,
    #[error("Could not access the audio input: {0}")]
    Acquisition(String),
}

/// Source of microphone audio. Acquired fresh for every recording attempt;
/// the stream is released by dropping the receiver.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn acquire(&self, format: AudioFormat) -> Result<mpsc::Receiver<Vec<u8>>, CaptureError>;
}

/// One capture state machine shared by the single-shot path and the
/// continuous voice-chat loop: idle -> recording -> processing -> idle.
/// Payload constraints (non-empty, under 2 MiB) are enforced in `stop`,
/// before anything can reach the network.
#[derive(Debug, Default)]
pub struct CaptureSession {
    state: CaptureState,
    format: AudioFormat,
    chunks: Vec<Vec<u8>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == CaptureState::Idle
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn is_processing(&self) -> bool {
        self.state == CaptureState::Processing
    }

    /// Begin a recording with a fresh chunk buffer. Callers acquire the
    /// input stream first; on acquisition failure this is never reached and
    /// the machine stays idle.
    pub fn start(&mut self, format: AudioFormat) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::NotIdle);
        }
        self.state = CaptureState::Recording;
        self.format = format;
        self.chunks.clear();
        Ok(())
    }

    /// Append one chunk. Empty chunks are ignored, matching the recorder
    /// event contract where zero-length data events carry nothing.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), CaptureError> {
        if self.state != CaptureState::Recording {
            return Err(CaptureError::NotRecording);
        }
        if !chunk.is_empty() {
            self.chunks.push(chunk.to_vec());
        }
        Ok(())
    }

    /// Stop recording and produce the upload payload. Zero collected chunks
    /// or an oversized payload reject before any network call and return the
    /// machine to idle; on success the machine is left in `Processing` until
    /// `finish` is called after the transcription attempt.
    pub fn stop(&mut self) -> Result<AudioPayload, CaptureError> {
        if self.state != CaptureState::Recording {
            return Err(CaptureError::NotRecording);
        }

        if self.chunks.is_empty() {
            self.state = CaptureState::Idle;
            return Err(CaptureError::NoAudio);
        }

        let total: usize = self.chunks
            .iter()
            .map(|c| c.len())
            .sum();
        if total >= MAX_AUDIO_BYTES {
            self.state = CaptureState::Idle;
            self.chunks.clear();
            return Err(CaptureError::TooLarge);
        }

        let mut data = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            data.extend_from_slice(&chunk);
        }

        self.state = CaptureState::Processing;
        Ok(AudioPayload::new(data, self.format))
    }

    /// Return from `Processing` to idle once the transcription attempt has
    /// completed, success or not.
    pub fn finish(&mut self) {
        self.state = CaptureState::Idle;
    }

    /// Drop any in-progress recording and return to idle.
    pub fn abort(&mut self) {
        self.state = CaptureState::Idle;
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_returns_concatenated_payload() {
        let mut capture = CaptureSession::new();
        capture.start(AudioFormat::Ogg).unwrap();
        capture.push_chunk(&[1, 2]).unwrap();
        capture.push_chunk(&[]).unwrap();
        capture.push_chunk(&[3]).unwrap();

        let payload = capture.stop().unwrap();
        assert_eq!(payload.data, vec![1, 2, 3]);
        assert_eq!(payload.format, AudioFormat::Ogg);
        assert!(capture.is_processing());

        capture.finish();
        assert!(capture.is_idle());
    }

    #[test]
    fn zero_chunk_recording_returns_to_idle_without_payload() {
        let mut capture = CaptureSession::new();
        capture.start(AudioFormat::Webm).unwrap();

        assert_eq!(capture.stop(), Err(CaptureError::NoAudio));
        assert!(capture.is_idle());
    }

    #[test]
    fn oversized_recording_is_rejected_before_upload() {
        let mut capture = CaptureSession::new();
        capture.start(AudioFormat::Webm).unwrap();
        capture.push_chunk(&vec![0u8; MAX_AUDIO_BYTES / 2]).unwrap();
        capture.push_chunk(&vec![0u8; MAX_AUDIO_BYTES / 2]).unwrap();

        assert_eq!(capture.stop(), Err(CaptureError::TooLarge));
        assert!(capture.is_idle());
    }

    #[test]
    fn new_recording_resets_the_chunk_buffer() {
        let mut capture = CaptureSession::new();
        capture.start(AudioFormat::Webm).unwrap();
        capture.push_chunk(&[9; 16]).unwrap();
        capture.abort();

        capture.start(AudioFormat::Webm).unwrap();
        capture.push_chunk(&[1]).unwrap();
        let payload = capture.stop().unwrap();
        assert_eq!(payload.data, vec![1]);
    }

    #[test]
    fn start_is_refused_while_processing() {
        let mut capture = CaptureSession::new();
        capture.start(AudioFormat::Webm).unwrap();
        capture.push_chunk(&[1]).unwrap();
        capture.stop().unwrap();

        assert_eq!(capture.start(AudioFormat::Webm), Err(CaptureError::NotIdle));
        assert_eq!(capture.push_chunk(&[2]), Err(CaptureError::NotRecording));
    }
}
