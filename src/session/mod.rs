pub mod capture;
pub mod playback;
pub mod voice_loop;

use thiserror::Error;

use crate::models::chat::{ ChatMessage, ChatTurn, Modality, Role };
use crate::speech::{ AudioFormat, SpeechError, Transcriber };
use self::capture::{ CaptureError, CaptureSession };

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Input buffer is empty")]
    EmptyInput,
    #[error("Voice input is still being processed")]
    Busy,
    #[error("Unknown message id: {0}")]
    UnknownMessage(String),
    #[error("Only user messages can be edited")]
    NotEditable,
    #[error("No response stream in progress for message id: {0}")]
    NotStreaming(String),
    #[error(transparent)] Capture(#[from] CaptureError),
    #[error(transparent)] Speech(#[from] SpeechError),
}

/// Snapshot handed to the completion service for one call: the ordered
/// transcript plus the modality of the turn that triggered it. The modality
/// travels with the job so the reply side can decide on auto speech playback
/// without any shared flag.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionJob {
    pub messages: Vec<ChatTurn>,
    pub modality: Modality,
}

/// Result of confirming an edit.
#[derive(Clone, Debug, PartialEq)]
pub enum EditOutcome {
    /// Whitespace-only content or no edit in progress; transcript untouched.
    Cancelled,
    /// Content replaced in place. `replay` is set when the edit target was
    /// not the last message: the transcript was truncated and the surviving
    /// messages must be re-asked.
    Edited {
        replay: Option<CompletionJob>,
    },
}

/// The conversational session controller: owns the transcript, the input
/// buffer, the at-most-one edit target and the recording sub-state. Purely
/// synchronous apart from `process_voice_input`; the UI event loop drives it
/// between awaits.
#[derive(Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    input: String,
    editing: Option<String>,
    pending_modality: Option<Modality>,
    streaming: Option<String>,
    capture: CaptureSession,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    fn turns(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|m| ChatTurn::new(m.role, m.content.clone()))
            .collect()
    }

    /// Submit the input buffer: appends exactly one user message, clears the
    /// buffer and returns the completion job for the network layer. Refused
    /// while a recording or transcription is in flight.
    pub fn submit(&mut self) -> Result<CompletionJob, SessionError> {
        if !self.capture.is_idle() {
            return Err(SessionError::Busy);
        }
        if self.input.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let content = std::mem::take(&mut self.input);
        let modality = self.pending_modality.take().unwrap_or(Modality::Text);
        self.messages.push(ChatMessage::new(Role::User, content));

        Ok(CompletionJob {
            messages: self.turns(),
            modality,
        })
    }

    /// Create the assistant message a streamed response grows into and
    /// return its id.
    pub fn begin_assistant(&mut self) -> String {
        let message = ChatMessage::new(Role::Assistant, "");
        let id = message.id.clone();
        self.messages.push(message);
        self.streaming = Some(id.clone());
        id
    }

    /// Append one streamed increment to the in-flight assistant message.
    pub fn append_delta(&mut self, id: &str, chunk: &str) -> Result<(), SessionError> {
        if self.streaming.as_deref() != Some(id) {
            return Err(SessionError::NotStreaming(id.to_string()));
        }
        let message = self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| SessionError::UnknownMessage(id.to_string()))?;
        message.content.push_str(chunk);
        Ok(())
    }

    /// Finalize the streamed assistant message; it is never mutated again.
    pub fn finalize_assistant(&mut self, id: &str) -> Result<(), SessionError> {
        if self.streaming.as_deref() != Some(id) {
            return Err(SessionError::NotStreaming(id.to_string()));
        }
        self.streaming = None;
        Ok(())
    }

    /// Handle a failed response stream. The user's message stays; the
    /// assistant placeholder is dropped if nothing arrived, kept as-is if
    /// the stream died midway. No rollback, no automatic retry.
    pub fn fail_assistant(&mut self, id: &str) {
        if self.streaming.as_deref() == Some(id) {
            self.streaming = None;
        }
        if let Some(index) = self.messages.iter().position(|m| m.id == id) {
            if self.messages[index].content.is_empty() {
                self.messages.remove(index);
            }
        }
    }

    /// Enter edit mode for one user-authored message, returning its current
    /// content. Starting a new edit silently replaces any prior target.
    pub fn begin_edit(&mut self, id: &str) -> Result<String, SessionError> {
        let message = self.messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| SessionError::UnknownMessage(id.to_string()))?;
        if message.role != Role::User {
            return Err(SessionError::NotEditable);
        }
        self.editing = Some(id.to_string());
        Ok(message.content.clone())
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Confirm an edit. Whitespace-only content cancels. Otherwise the
    /// target's content is replaced in place; when the target was not the
    /// last message, the transcript is truncated to `edit_index + 2`
    /// elements (the edited message plus at most one follow-up) and a replay
    /// job over exactly the surviving messages is returned.
    pub fn submit_edit(&mut self, content: &str) -> Result<EditOutcome, SessionError> {
        let Some(id) = self.editing.take() else {
            return Ok(EditOutcome::Cancelled);
        };

        if content.trim().is_empty() {
            return Ok(EditOutcome::Cancelled);
        }

        let index = self.messages
            .iter()
            .position(|m| m.id == id)
            .ok_or(SessionError::UnknownMessage(id))?;

        self.messages[index].content = content.to_string();

        let last_index = self.messages.len() - 1;
        if index == last_index {
            return Ok(EditOutcome::Edited { replay: None });
        }

        self.messages.truncate(index + 2);
        Ok(EditOutcome::Edited {
            replay: Some(CompletionJob {
                messages: self.turns(),
                modality: Modality::Text,
            }),
        })
    }

    // --- voice input -----------------------------------------------------

    /// Start a recording. The input stream must already be acquired; refused
    /// while a response stream or a transcription is in flight.
    pub fn start_recording(&mut self, format: AudioFormat) -> Result<(), SessionError> {
        if self.streaming.is_some() {
            return Err(SessionError::Busy);
        }
        self.capture.start(format)?;
        Ok(())
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), SessionError> {
        self.capture.push_chunk(chunk)?;
        Ok(())
    }

    pub fn recording_state(&self) -> capture::CaptureState {
        self.capture.state()
    }

    pub fn abort_recording(&mut self) {
        self.capture.abort();
    }

    /// Stop the recording and run the transcription attempt to completion.
    /// On non-empty transcribed text the input buffer is populated as if
    /// typed and the next submission is tagged as voice; `Ok(None)` means
    /// speech was not understood. Every path leaves the recorder idle.
    pub async fn process_voice_input(
        &mut self,
        transcriber: &dyn Transcriber
    ) -> Result<Option<String>, SessionError> {
        let payload = self.capture.stop()?;

        let result = transcriber.transcribe(&payload).await;
        self.capture.finish();

        let transcription = result?;
        let text = transcription.text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        self.input = text.to_string();
        self.pending_modality = Some(Modality::Voice);
        Ok(Some(text.to_string()))
    }

    /// Merge a finished voice-chat history into the transcript, in order.
    pub fn merge_voice_history(&mut self, turns: Vec<ChatTurn>) {
        for turn in turns {
            self.messages.push(ChatMessage::new(turn.role, turn.content));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{ AudioPayload, Transcription };
    use async_trait::async_trait;

    struct FixedTranscriber {
        text: Option<String>,
        fail: bool,
    }

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, audio: &AudioPayload) -> Result<Transcription, SpeechError> {
            audio.validate()?;
            if self.fail {
                return Err(SpeechError::Transcription("upstream down".to_string()));
            }
            Ok(Transcription {
                text: self.text.clone().unwrap_or_default(),
            })
        }
    }

    fn session_with_turns(turns: &[(Role, &str)]) -> ChatSession {
        let mut session = ChatSession::new();
        for (role, content) in turns {
            session.messages.push(ChatMessage::new(*role, *content));
        }
        session
    }

    #[test]
    fn submit_appends_one_user_message_and_clears_input() {
        let mut session = ChatSession::new();
        session.set_input("Hello");

        let job = session.submit().unwrap();

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::User);
        assert_eq!(session.messages()[0].content, "Hello");
        assert_eq!(session.input(), "");
        assert_eq!(job.messages.len(), 1);
        assert_eq!(job.modality, Modality::Text);
    }

    #[test]
    fn whitespace_input_is_refused() {
        let mut session = ChatSession::new();
        session.set_input("   \n");
        assert!(matches!(session.submit(), Err(SessionError::EmptyInput)));
        assert!(session.messages().is_empty());
    }

    #[test]
    fn streamed_response_grows_then_freezes() {
        let mut session = ChatSession::new();
        session.set_input("Hello");
        session.submit().unwrap();

        let id = session.begin_assistant();
        session.append_delta(&id, "Hi ").unwrap();
        session.append_delta(&id, "there").unwrap();
        session.finalize_assistant(&id).unwrap();

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].content, "Hi there");
        assert!(matches!(
            session.append_delta(&id, "!"),
            Err(SessionError::NotStreaming(_))
        ));
    }

    #[test]
    fn failed_stream_drops_only_the_empty_placeholder() {
        let mut session = ChatSession::new();
        session.set_input("Hello");
        session.submit().unwrap();

        let id = session.begin_assistant();
        session.fail_assistant(&id);

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::User);

        let id = session.begin_assistant();
        session.append_delta(&id, "partial").unwrap();
        session.fail_assistant(&id);

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].content, "partial");
    }

    #[test]
    fn editing_the_last_message_never_truncates() {
        let mut session = session_with_turns(
            &[
                (Role::User, "u0"),
                (Role::Assistant, "a0"),
                (Role::User, "u1"),
            ]
        );
        let id = session.messages()[2].id.clone();

        session.begin_edit(&id).unwrap();
        let outcome = session.submit_edit("u1 edited").unwrap();

        assert_eq!(outcome, EditOutcome::Edited { replay: None });
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[2].content, "u1 edited");
    }

    #[test]
    fn editing_an_earlier_message_truncates_and_replays() {
        let mut session = session_with_turns(
            &[
                (Role::User, "u0"),
                (Role::Assistant, "a0"),
                (Role::User, "u1"),
                (Role::Assistant, "a1"),
            ]
        );
        let id = session.messages()[0].id.clone();

        session.begin_edit(&id).unwrap();
        let outcome = session.submit_edit("u0 edited").unwrap();

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].content, "u0 edited");
        assert_eq!(session.messages()[1].content, "a0");

        match outcome {
            EditOutcome::Edited { replay: Some(job) } => {
                assert_eq!(job.messages.len(), 2);
                assert_eq!(job.messages[0].content, "u0 edited");
                assert_eq!(job.messages[1].content, "a0");
            }
            other => panic!("expected replay job, got {:?}", other),
        }
    }

    #[test]
    fn whitespace_edit_cancels_without_touching_the_transcript() {
        let mut session = session_with_turns(
            &[
                (Role::User, "u0"),
                (Role::Assistant, "a0"),
            ]
        );
        let before = session.messages().to_vec();
        let id = session.messages()[0].id.clone();

        session.begin_edit(&id).unwrap();
        let outcome = session.submit_edit("   ").unwrap();

        assert_eq!(outcome, EditOutcome::Cancelled);
        assert_eq!(session.messages(), before.as_slice());
        assert!(session.editing_id().is_none());
    }

    #[test]
    fn starting_a_new_edit_replaces_the_prior_target() {
        let mut session = session_with_turns(
            &[
                (Role::User, "u0"),
                (Role::Assistant, "a0"),
                (Role::User, "u1"),
            ]
        );
        let first = session.messages()[0].id.clone();
        let second = session.messages()[2].id.clone();

        session.begin_edit(&first).unwrap();
        session.begin_edit(&second).unwrap();
        assert_eq!(session.editing_id(), Some(second.as_str()));

        let outcome = session.submit_edit("u1 edited").unwrap();
        assert_eq!(outcome, EditOutcome::Edited { replay: None });
        assert_eq!(session.messages()[0].content, "u0");
    }

    #[test]
    fn assistant_messages_cannot_be_edited() {
        let mut session = session_with_turns(
            &[
                (Role::User, "u0"),
                (Role::Assistant, "a0"),
            ]
        );
        let id = session.messages()[1].id.clone();
        assert!(matches!(session.begin_edit(&id), Err(SessionError::NotEditable)));
    }

    #[tokio::test]
    async fn voice_input_populates_the_buffer_and_tags_the_next_submission() {
        let mut session = ChatSession::new();
        session.start_recording(AudioFormat::Webm).unwrap();
        // Three chunks totaling ~500 KB.
        for _ in 0..3 {
            session.push_chunk(&vec![0u8; 170 * 1024]).unwrap();
        }

        let transcriber = FixedTranscriber {
            text: Some("Should I take the offer?".to_string()),
            fail: false,
        };
        let text = session.process_voice_input(&transcriber).await.unwrap();

        assert_eq!(text.as_deref(), Some("Should I take the offer?"));
        assert_eq!(session.input(), "Should I take the offer?");
        assert!(session.recording_state() == capture::CaptureState::Idle);

        let job = session.submit().unwrap();
        assert_eq!(job.modality, Modality::Voice);

        // The tag does not leak into the following typed submission.
        session.set_input("typed follow-up");
        let job = session.submit().unwrap();
        assert_eq!(job.modality, Modality::Text);
    }

    #[tokio::test]
    async fn empty_transcription_returns_none_and_leaves_the_buffer() {
        let mut session = ChatSession::new();
        session.start_recording(AudioFormat::Webm).unwrap();
        session.push_chunk(&[1, 2, 3]).unwrap();

        let transcriber = FixedTranscriber { text: Some("  ".to_string()), fail: false };
        let text = session.process_voice_input(&transcriber).await.unwrap();

        assert_eq!(text, None);
        assert_eq!(session.input(), "");
        assert!(session.recording_state() == capture::CaptureState::Idle);
    }

    #[tokio::test]
    async fn transcription_failure_returns_the_recorder_to_idle() {
        let mut session = ChatSession::new();
        session.start_recording(AudioFormat::Webm).unwrap();
        session.push_chunk(&[1]).unwrap();

        let transcriber = FixedTranscriber { text: None, fail: true };
        let result = session.process_voice_input(&transcriber).await;

        assert!(matches!(result, Err(SessionError::Speech(_))));
        assert!(session.recording_state() == capture::CaptureState::Idle);
    }

    #[tokio::test]
    async fn submission_is_refused_while_voice_processing() {
        let mut session = ChatSession::new();
        session.start_recording(AudioFormat::Webm).unwrap();
        session.set_input("typed while recording");

        assert!(matches!(session.submit(), Err(SessionError::Busy)));
        assert!(matches!(
            session.start_recording(AudioFormat::Webm),
            Err(SessionError::Capture(CaptureError::NotIdle))
        ));
    }

    #[test]
    fn merge_appends_voice_turns_in_order() {
        let mut session = session_with_turns(&[(Role::User, "typed")]);
        session.merge_voice_history(
            vec![ChatTurn::new(Role::User, "spoken"), ChatTurn::new(Role::Assistant, "reply")]
        );

        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[1].content, "spoken");
        assert_eq!(session.messages()[2].role, Role::Assistant);
    }
}
